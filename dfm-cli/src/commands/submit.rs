//! `dfmctl submit`: read a `Process` node from a JSON or YAML file and
//! schedule it through the same `schedule_execute` routing every
//! `dfm-process` request goes through, printing the `request_id` a
//! caller would then pass to `tail`.

use std::path::Path;

use dfm_core::function_call::Process;
use dfm_runtime::request::DfmRequest;
use uuid::Uuid;

use super::connect;

fn load_process(path: &Path) -> anyhow::Result<Process> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
        _ => Ok(serde_json::from_str(&content)?),
    }
}

pub async fn run(pipeline: &Path, site: &str, target_site: Option<String>) -> anyhow::Result<()> {
    let mut process = load_process(pipeline)?;
    if let Some(target) = target_site {
        process.execute.site = Some(target);
    }

    let transport = connect().await?;
    let request_id = Uuid::new_v4();
    let request = DfmRequest::new(transport, site.to_string(), site.to_string(), request_id);

    request.schedule_execute(*process.execute, None).await?;

    println!("{request_id}");
    Ok(())
}
