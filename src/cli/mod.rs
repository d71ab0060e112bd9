mod args;
mod devices;

pub use args::{Cli, CliCommand, DevicesCliArgs};
pub use devices::handle_devices_command;
