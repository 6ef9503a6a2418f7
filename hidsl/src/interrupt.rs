//! Ctrl-C handling
//!
//! An interrupt must not kill us while file systems are mounted on the staging
//! directory. The signal is recorded instead, the tool running in the
//! foreground gets it on its own, and the pipeline stops at its next step
//! with [`HidslError::Aborted`], unwinding through the mount scope.

use core::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use types::HidslError;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

pub(crate) fn install() -> Result<(), HidslError> {
    ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst)).map_err(|e| {
        HidslError::Custom(format!("Couldn't install the interrupt handler: {e}"))
    })?;

    debug!("Interrupt handler installed");
    Ok(())
}

pub(crate) fn is_set() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

pub(crate) fn check() -> Result<(), HidslError> {
    if is_set() {
        return Err(HidslError::Aborted);
    }

    Ok(())
}
