//! `dfmctl tail`: poll `request:{id}.responses` and print each entry as a
//! JSON line, optionally following until the process is interrupted —
//! the terminal-friendly analogue of the `GET /responses` SSE endpoint.

use std::time::Duration;

use uuid::Uuid;

use super::connect;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run(request_id: Uuid, follow: bool) -> anyhow::Result<()> {
    let transport = connect().await?;
    let mut next_index = 0usize;

    loop {
        let responses = transport.get_responses(request_id).await?;
        for response in &responses[next_index..] {
            println!("{}", serde_json::to_string(response)?);
        }
        next_index = responses.len();

        if !follow {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
