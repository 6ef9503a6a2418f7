use log::{debug, warn};

use crate::exec::{Runner, ToolCommand};

const BEEP: &str = "/usr/bin/beep";

#[derive(Clone, Copy, Debug)]
struct Note {
    frequency: u32,
    repetitions: Option<u32>,
    length: Option<u32>,
}

impl Note {
    const fn new(frequency: u32) -> Self {
        Self {
            frequency,
            repetitions: None,
            length: None,
        }
    }

    const fn repeated(frequency: u32, repetitions: u32) -> Self {
        Self {
            frequency,
            repetitions: Some(repetitions),
            length: None,
        }
    }

    const fn held(frequency: u32, repetitions: u32, length: u32) -> Self {
        Self {
            frequency,
            repetitions: Some(repetitions),
            length: Some(length),
        }
    }

    fn args(self) -> Vec<String> {
        let mut args = vec![String::from("-f"), self.frequency.to_string()];

        if let Some(repetitions) = self.repetitions {
            args.extend([String::from("-r"), repetitions.to_string()]);
        }

        if let Some(length) = self.length {
            args.extend([String::from("-l"), length.to_string()]);
        }

        args
    }
}

const MELODY: [Note; 9] = [
    Note::new(1000),
    Note::new(1500),
    Note::new(600),
    Note::new(500),
    Note::held(100, 2, 10),
    Note::held(50, 2, 200),
    Note::held(40, 2, 300),
    Note::repeated(60, 3),
    Note::repeated(50, 3),
];

fn melody_args(melody: &[Note]) -> Vec<String> {
    let mut args = Vec::new();

    for (idx, note) in melody.iter().enumerate() {
        if idx > 0 {
            args.push(String::from("-n"));
        }

        args.extend(note.args());
    }

    args
}

/// Plays the completion melody on the PC speaker
///
/// Machines without a speaker, or without `beep`, are common enough that
/// failing to beep is only worth a warning.
pub(crate) fn beep(runner: &dyn Runner) {
    debug!("Beeping");

    if let Err(e) = runner.run(&ToolCommand::new(BEEP).args(melody_args(&MELODY))) {
        warn!("Couldn't beep: {e}");
    }
}
