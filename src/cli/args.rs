use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "sourcectl")]
#[command(about = "Single-active audio source controller", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Print version information
    Version,
    /// List capture devices and show the resolved line-in device
    Devices(DevicesCliArgs),
}

#[derive(ClapArgs, Debug)]
pub struct DevicesCliArgs {
    /// Resolve this device setting instead of the stored one (e.g. "auto")
    #[arg(long)]
    pub device: Option<String>,
}
