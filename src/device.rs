use crossbeam_channel::Sender;
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use view::Value;

/// A parameter change reported by the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub index: usize,
    pub page: usize,
    pub value: Value,
}

/// Outbound side of the device layer.
pub trait DeviceLink {
    fn submit(&mut self, index: usize, page: usize, value: &Value) -> anyhow::Result<()>;
}

/// Stand-in used when no device port is configured: submissions are only
/// logged.
pub struct OfflineDevice;

impl DeviceLink for OfflineDevice {
    fn submit(&mut self, index: usize, page: usize, value: &Value) -> anyhow::Result<()> {
        log::info!("Device (offline): param {index} part {page} = {value}");
        Ok(())
    }
}

/// Control change transport: parameter `index` is controller number `index`
/// on MIDI channel `page`.
pub struct MidiDevice {
    port_name: String,
    output: MidiOutputConnection,
    _input: Option<MidiInputConnection<()>>,
}

impl MidiDevice {
    /// Connect to the first output port whose name contains `filter`, and to
    /// a matching input port if there is one. Inbound control changes are
    /// forwarded to `events`.
    pub fn connect(filter: &str, events: Sender<DeviceEvent>) -> anyhow::Result<Self> {
        let midi_out = MidiOutput::new("knobedit")?;
        let port = midi_out
            .ports()
            .into_iter()
            .find(|p| midi_out.port_name(p).is_ok_and(|n| n.contains(filter)))
            .ok_or_else(|| anyhow::anyhow!("no MIDI output port matching '{filter}'"))?;
        let port_name = midi_out.port_name(&port)?;
        let output = midi_out
            .connect(&port, "knobedit-device")
            .map_err(|e| anyhow::anyhow!("failed to open {port_name}: {e}"))?;
        log::info!("Opened device output: {port_name}");

        let input = match Self::connect_input(filter, events) {
            Ok(conn) => conn,
            Err(e) => {
                log::warn!("Device input unavailable ({e}); edits from the synth will not show");
                None
            }
        };

        Ok(Self {
            port_name,
            output,
            _input: input,
        })
    }

    fn connect_input(
        filter: &str,
        events: Sender<DeviceEvent>,
    ) -> anyhow::Result<Option<MidiInputConnection<()>>> {
        let midi_in = MidiInput::new("knobedit")?;
        let Some(port) = midi_in
            .ports()
            .into_iter()
            .find(|p| midi_in.port_name(p).is_ok_and(|n| n.contains(filter)))
        else {
            return Ok(None);
        };
        let name = midi_in.port_name(&port)?;
        let log_name = name.clone();
        let conn = midi_in
            .connect(
                &port,
                "knobedit-device-in",
                move |_timestamp_us, bytes, _| {
                    let Some(event) = decode_control_change(bytes) else {
                        return;
                    };
                    log::trace!("Device in [{log_name}] {event:?}");
                    if events.try_send(event).is_err() {
                        log::warn!("Device event channel full, dropping change from {log_name}");
                    }
                },
                (),
            )
            .map_err(|e| anyhow::anyhow!("failed to open {name}: {e}"))?;
        log::info!("Opened device input: {name}");
        Ok(Some(conn))
    }
}

impl DeviceLink for MidiDevice {
    fn submit(&mut self, index: usize, page: usize, value: &Value) -> anyhow::Result<()> {
        let Some(message) = encode_control_change(index, page, value) else {
            log::debug!("No control change for param {index} = {value}, not sent");
            return Ok(());
        };
        self.output
            .send(&message)
            .map_err(|e| anyhow::anyhow!("send to {} failed: {e}", self.port_name))
    }
}

fn encode_control_change(index: usize, page: usize, value: &Value) -> Option<[u8; 3]> {
    let controller = u8::try_from(index).ok().filter(|&c| c < 0x80)?;
    let value = value.as_int()?.clamp(0, 127) as u8;
    Some([0xB0 | (page as u8 & 0x0F), controller, value])
}

fn decode_control_change(bytes: &[u8]) -> Option<DeviceEvent> {
    match *bytes {
        [status, controller, value] if status & 0xF0 == 0xB0 => Some(DeviceEvent {
            index: usize::from(controller),
            page: usize::from(status & 0x0F),
            value: Value::Int(i32::from(value)),
        }),
        _ => None,
    }
}

#[cfg(test)]
pub use recording::RecordingDevice;

#[cfg(test)]
mod recording {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// Device link that records every submission. Clones share the log.
    #[derive(Clone, Default)]
    pub struct RecordingDevice {
        pub sent: Rc<RefCell<Vec<(usize, usize, Value)>>>,
        pub fail: bool,
    }

    impl DeviceLink for RecordingDevice {
        fn submit(&mut self, index: usize, page: usize, value: &Value) -> anyhow::Result<()> {
            self.sent.borrow_mut().push((index, page, value.clone()));
            if self.fail {
                anyhow::bail!("device unplugged");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_change_uses_page_as_channel() {
        assert_eq!(
            encode_control_change(74, 3, &Value::Int(64)),
            Some([0xB3, 74, 64])
        );
        assert_eq!(
            encode_control_change(7, 0, &Value::Int(300)),
            Some([0xB0, 7, 127])
        );
    }

    #[test]
    fn unencodable_changes_are_skipped() {
        assert_eq!(encode_control_change(200, 0, &Value::Int(1)), None);
        assert_eq!(encode_control_change(1, 0, &Value::Text("Init".into())), None);
    }

    #[test]
    fn decodes_inbound_control_change() {
        assert_eq!(
            decode_control_change(&[0xB1, 20, 99]),
            Some(DeviceEvent { index: 20, page: 1, value: Value::Int(99) })
        );
        assert_eq!(decode_control_change(&[0x91, 60, 100]), None);
        assert_eq!(decode_control_change(&[0xB1, 20]), None);
    }
}
