use anyhow::bail;
use dotlaunch::catalog::PatchDescriptor;
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{builtin_catalog, load_config},
    output::{print_output, print_listing, Column, Listing},
};

#[derive(Debug, Serialize)]
pub struct PatchInfo {
    pub id: String,
    pub module: String,
    pub description: String,
    pub interceptions: Vec<InterceptionInfo>,
    pub default: bool,
}

#[derive(Debug, Serialize)]
pub struct InterceptionInfo {
    pub target: String,
    pub mode: String,
}

fn describe(descriptor: &PatchDescriptor, defaults: &[String]) -> PatchInfo {
    PatchInfo {
        id: descriptor.id().to_string(),
        module: descriptor.target_module().to_string(),
        description: descriptor.description().to_string(),
        interceptions: descriptor
            .interceptions()
            .iter()
            .map(|interception| InterceptionInfo {
                target: interception.target(),
                mode: interception.mode().to_string(),
            })
            .collect(),
        default: defaults.iter().any(|id| id == descriptor.id()),
    }
}

impl Listing for PatchInfo {
    const COLUMNS: &'static [Column] = &[
        Column::text("ID"),
        Column::text("MODULE"),
        Column::text("TARGET"),
        Column::text("MODE"),
        Column::text("DEFAULT"),
    ];

    /// One row per interception. Only the first names the patch.
    fn rows(&self) -> Vec<Vec<String>> {
        self.interceptions
            .iter()
            .enumerate()
            .map(|(index, interception)| {
                let (id, module, default) = match index {
                    0 => (
                        self.id.clone(),
                        self.module.clone(),
                        if self.default { "yes" } else { "" }.to_string(),
                    ),
                    _ => (String::new(), String::new(), String::new()),
                };
                vec![
                    id,
                    module,
                    interception.target.clone(),
                    interception.mode.clone(),
                    default,
                ]
            })
            .collect()
    }
}

pub fn run(id: Option<&str>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let config = load_config(opts)?;
    let catalog = builtin_catalog(&config);

    let patches: Vec<PatchInfo> = match id {
        Some(id) => match catalog.get(id) {
            Some(descriptor) => vec![describe(&descriptor, &config.patches)],
            None => bail!("unknown patch: {id}"),
        },
        None => catalog
            .list_all()
            .iter()
            .map(|descriptor| describe(descriptor, &config.patches))
            .collect(),
    };

    print_output(&patches, opts, |patches| {
        print_listing(patches);

        if let [single] = patches.as_slice() {
            println!();
            println!("{}", single.description);
        }
    })
}
