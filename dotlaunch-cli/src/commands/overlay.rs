use std::path::Path;

use dotlaunch::overlay::{evaluate, DeviceIdentity};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::load_config,
    output::{print_output, print_listing, Column, Listing},
};

#[derive(Debug, Serialize)]
pub struct OverlayDecision {
    pub manufacturer: String,
    pub brand: String,
    pub enabled: bool,
    pub workload_match: bool,
    pub device_match: bool,
    pub active: bool,
    pub profile: Vec<(String, String)>,
}

/// One overlay variable as `(name, value)`.
impl Listing for (String, String) {
    const COLUMNS: &'static [Column] = &[Column::text("VARIABLE"), Column::text("VALUE")];

    fn rows(&self) -> Vec<Vec<String>> {
        vec![vec![self.0.clone(), self.1.clone()]]
    }
}

pub fn run(
    module: &Path,
    manufacturer: Option<&str>,
    brand: Option<&str>,
    enabled: bool,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let config = load_config(opts)?;

    let mut identity = DeviceIdentity::from_env();
    if let Some(manufacturer) = manufacturer {
        identity.manufacturer = manufacturer.to_string();
    }
    if let Some(brand) = brand {
        identity.brand = brand.to_string();
    }

    let hint = evaluate(&config.overlay, &identity, module, enabled);
    let decision = OverlayDecision {
        manufacturer: identity.manufacturer,
        brand: identity.brand,
        enabled: hint.enabled,
        workload_match: hint.workload_match,
        device_match: hint.device_match,
        active: hint.is_active(),
        profile: config
            .overlay
            .overlay_profile()
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string_lossy().into_owned()))
            .collect(),
    };

    print_output(&decision, opts, |d| {
        let yes_no = |value: bool| if value { "yes" } else { "no" };
        println!("Device:   {} / {}", d.manufacturer, d.brand);
        println!("Enabled:  {}", yes_no(d.enabled));
        println!("Workload: {}", yes_no(d.workload_match));
        println!("Family:   {}", yes_no(d.device_match));
        println!("Overlay:  {}", if d.active { "active" } else { "inactive" });

        if d.active {
            println!();
            print_listing(&d.profile);
        }
    })
}
