//! `dfmctl site`: load a site config (and optional secrets file),
//! validate that it parses and merges, and report the `api_class`
//! coverage of every configured provider's `interface` table.

use std::path::Path;

use dfm_config::{SiteConfig, SiteSecrets};

pub fn run(config: &Path, secrets: Option<&Path>) -> anyhow::Result<()> {
    let mut site = SiteConfig::load_file(config)?;
    if let Some(secrets_path) = secrets {
        let secrets = SiteSecrets::load_file(secrets_path)?;
        site.merge_secrets(&secrets);
    }

    println!("site: {}", site.site);
    println!("default_provider: {}", site.default_provider);
    for (name, provider) in &site.providers {
        println!("provider: {name} ({})", provider.provider_class);
        let mut classes: Vec<_> = provider.interface.keys().collect();
        classes.sort();
        for api_class in classes {
            println!("  {api_class}");
        }
    }
    Ok(())
}
