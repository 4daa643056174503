// Minimal front end: bring up a headless device and report it.
//
// Prints `vkscene: <gpu> ready (Vulkan x.y.z)` and exits 0, or logs the
// error chain and exits 1 when no usable GPU is found.

use std::process::ExitCode;

use vkscene::backend::VulkanDevice;
use vkscene::config::Config;

fn main() -> ExitCode {
    let config = Config::load();
    env_logger::Builder::new()
        .filter_level(config.log_filter())
        .parse_env(env_logger::Env::default())
        .init();

    match VulkanDevice::new("vkscene device_status", config.debug.validation_layers, None) {
        Ok(device) => {
            println!("vkscene: {} ready (Vulkan {})", device.name(), device.api_version_string());
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Failed to create Vulkan device: {}", e);
            ExitCode::FAILURE
        }
    }
}
