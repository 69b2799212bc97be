use std::collections::HashSet;

use crossbeam_channel::Sender;
use midir::{MidiInput, MidiInputConnection};

use crate::config::KnobsConfig;

/// A physical knob was turned by `delta` detents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnobEvent {
    pub knob: usize,
    pub delta: i32,
}

/// Turns control changes from a knob controller into knob events. Knob `n`
/// sends controller `first_cc + n` on any channel.
#[derive(Clone)]
pub struct KnobDecoder {
    first_cc: u8,
    count: u8,
    relative: bool,
    last: Vec<Option<u8>>,
}

impl KnobDecoder {
    pub fn new(config: &KnobsConfig) -> Self {
        KnobDecoder {
            first_cc: config.first_cc,
            count: config.count,
            relative: config.relative,
            last: vec![None; usize::from(config.count)],
        }
    }

    /// Relative controllers send 64 ± detents; absolute ones send a position
    /// and the first message after connecting only records it.
    pub fn decode(&mut self, bytes: &[u8]) -> Option<KnobEvent> {
        let [status, controller, value] = *bytes else {
            return None;
        };
        if status & 0xF0 != 0xB0 {
            return None;
        }
        let knob = controller.checked_sub(self.first_cc).filter(|&k| k < self.count)?;
        let knob = usize::from(knob);
        let delta = if self.relative {
            i32::from(value) - 64
        } else {
            let previous = self.last[knob].replace(value)?;
            i32::from(value) - i32::from(previous)
        };
        (delta != 0).then_some(KnobEvent { knob, delta })
    }
}

pub struct MidiManager {
    sender: Sender<KnobEvent>,
    device_filter: Option<String>,
    decoder: KnobDecoder,
    connections: Vec<MidiInputConnection<()>>,
    connected_names: HashSet<String>,
}

impl MidiManager {
    pub fn new(
        sender: Sender<KnobEvent>,
        device_filter: Option<String>,
        config: &KnobsConfig,
    ) -> Self {
        MidiManager {
            sender,
            device_filter,
            decoder: KnobDecoder::new(config),
            connections: Vec::new(),
            connected_names: HashSet::new(),
        }
    }

    /// Open all available MIDI input ports (or those matching the filter).
    /// Returns the number of newly opened connections.
    pub fn open_ports(&mut self) -> anyhow::Result<usize> {
        let midi_in = MidiInput::new("knobedit")?;
        let ports = midi_in.ports();
        let mut opened = 0;

        for port in &ports {
            let name = match midi_in.port_name(port) {
                Ok(n) => n,
                Err(_) => continue,
            };

            if self.connected_names.contains(&name) {
                continue;
            }

            if let Some(ref filter) = self.device_filter
                && !name.contains(filter.as_str())
            {
                continue;
            }

            let sender = self.sender.clone();
            let mut decoder = self.decoder.clone();
            let log_name = name.clone();

            // Need a fresh MidiInput for each connection
            let midi_in_for_port = MidiInput::new("knobedit")?;
            match midi_in_for_port.connect(
                port,
                &name,
                move |_timestamp_us, bytes, _| {
                    let Some(event) = decoder.decode(bytes) else {
                        log::trace!("Knobs in [{log_name}] ignored data={bytes:02x?}");
                        return;
                    };
                    log::debug!("Knobs in [{log_name}] knob {} delta {}", event.knob, event.delta);
                    if sender.try_send(event).is_err() {
                        log::warn!("Knob channel full, dropping turn from {log_name}");
                    }
                },
                (),
            ) {
                Ok(conn) => {
                    log::info!("Opened knob controller: {name}");
                    self.connected_names.insert(name);
                    self.connections.push(conn);
                    opened += 1;
                }
                Err(e) => {
                    log::warn!("Failed to open MIDI input {name}: {e}");
                }
            }
        }

        Ok(opened)
    }

    /// Poll for newly connected controllers. Call periodically from the main
    /// loop.
    pub fn poll_new_devices(&mut self) {
        match self.open_ports() {
            Ok(0) => {}
            Ok(n) => log::info!("Opened {n} new knob controller(s)"),
            Err(e) => log::warn!("MIDI poll error: {e}"),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder(relative: bool) -> KnobDecoder {
        KnobDecoder::new(&KnobsConfig {
            relative,
            ..KnobsConfig::default()
        })
    }

    #[test]
    fn relative_knobs_are_centred_on_64() {
        let mut d = decoder(true);
        assert_eq!(d.decode(&[0xB0, 20, 65]), Some(KnobEvent { knob: 0, delta: 1 }));
        assert_eq!(d.decode(&[0xB5, 27, 61]), Some(KnobEvent { knob: 7, delta: -3 }));
        assert_eq!(d.decode(&[0xB0, 21, 64]), None);
    }

    #[test]
    fn controllers_outside_the_bank_are_ignored() {
        let mut d = decoder(true);
        assert_eq!(d.decode(&[0xB0, 19, 65]), None);
        assert_eq!(d.decode(&[0xB0, 28, 65]), None);
        assert_eq!(d.decode(&[0x90, 20, 65]), None);
        assert_eq!(d.decode(&[0xF0, 0x7E]), None);
    }

    #[test]
    fn absolute_knobs_report_movement_since_last_position() {
        let mut d = decoder(false);
        assert_eq!(d.decode(&[0xB0, 22, 40]), None);
        assert_eq!(d.decode(&[0xB0, 22, 43]), Some(KnobEvent { knob: 2, delta: 3 }));
        assert_eq!(d.decode(&[0xB0, 22, 41]), Some(KnobEvent { knob: 2, delta: -2 }));
        assert_eq!(d.decode(&[0xB0, 23, 41]), None);
    }
}
