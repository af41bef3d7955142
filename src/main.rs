use std::env::consts::{ARCH, FAMILY, OS};

use anyhow::Error;
use tracing::trace;

use crate::program::Program;

mod booru;
mod program;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    let program = Program::new();
    program.run().await
}

/// Logs important information about the system being used.
pub(crate) fn log_system_information() {
    trace!("Printing system information out into log for debug purposes...");
    trace!("ARCH:           \"{}\"", ARCH);
    trace!("FAMILY:         \"{}\"", FAMILY);
    trace!("OS:             \"{}\"", OS);
}
