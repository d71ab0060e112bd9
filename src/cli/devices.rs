use super::args::DevicesCliArgs;
use crate::config::Config;
use crate::resolver::{self, ArecordLister, DeviceLister, AUTO_DEVICE};
use crate::store::{keys, ConfigStore, EnvFileStore};
use anyhow::Result;

pub async fn handle_devices_command(args: DevicesCliArgs) -> Result<()> {
    let config = Config::load()?;
    let lister = ArecordLister::new(&config.resolver);

    let configured = match args.device {
        Some(device) => device,
        None => EnvFileStore::new(config.store_path()?)
            .get(keys::LINEIN_CAPTURE)?
            .unwrap_or_else(|| AUTO_DEVICE.to_string()),
    };

    match lister.list_capture_devices().await {
        Ok(listing) if !listing.trim().is_empty() => println!("{}", listing.trim_end()),
        Ok(_) => println!("No capture devices found."),
        Err(e) => eprintln!("Failed to list capture devices: {:#}", e),
    }

    let resolved = resolver::resolve_linein_device(&configured, &lister).await;
    println!();
    println!("Line-in setting: {}", configured);
    println!("Resolved device: {}", resolved);
    Ok(())
}
