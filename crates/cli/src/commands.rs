//! One function per operator action; each maps to a dispatcher command
//! and renders the reply as plain text.

use std::path::Path;

use simdock_core::protocol::{
    CreateQueueEntryRequest, Envelope, MachineQueueRequest, QueueItem, RebookRequest, SidRequest,
    UpdateItemRequest,
};
use simdock_core::state::state_name;
use simdock_core::{Sid, Timestamp};

use crate::client::{CliClient, CliError};

pub async fn add(
    client: &CliClient,
    file: &Path,
    name: Option<String>,
    priority: i32,
    description: String,
    url: String,
) -> Result<(), CliError> {
    let original_filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config.json5".to_string());
    let name = name.unwrap_or_else(|| {
        file.file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let request = CreateQueueEntryRequest {
        name,
        priority,
        description,
        url,
        original_filename,
    };
    let envelope = Envelope::with_data("NewSimulation", &client.username, &request)?;
    let reply = client.send_with_file(&envelope, file).await?;
    println!("Created queue item with SID {}", reply["ID"]);
    Ok(())
}

pub async fn list_active(client: &CliClient) -> Result<(), CliError> {
    let reply = client.send(&Envelope::new("GetActiveQueue", &client.username)).await?;
    print_queue(&reply)
}

pub async fn list_done(client: &CliClient) -> Result<(), CliError> {
    let reply = client
        .send(&Envelope::new("GetCompletedQueue", &client.username))
        .await?;
    print_queue(&reply)
}

pub async fn machine_queue(client: &CliClient, machine_id: &str) -> Result<(), CliError> {
    let request = MachineQueueRequest {
        machine_id: machine_id.to_string(),
    };
    let envelope = Envelope::with_data("GetMachineQueue", &client.username, &request)?;
    let reply = client.send(&envelope).await?;
    print_queue(&reply)
}

pub async fn show_sid(client: &CliClient, sid: Sid) -> Result<(), CliError> {
    let envelope = Envelope::with_data("GetSID", &client.username, &SidRequest { sid })?;
    let reply = client.send(&envelope).await?;

    let items: Vec<QueueItem> =
        serde_json::from_value(reply["Data"].clone()).unwrap_or_default();
    match items.into_iter().next() {
        Some(item) => {
            println!("SID:         {}", item.sid);
            println!("Name:        {}", item.name);
            println!("File:        {}", item.file);
            println!("Username:    {}", item.username);
            println!("Priority:    {}", item.priority);
            println!("Description: {}", item.description);
            println!("MachineID:   {}", item.machine_id);
            println!("URL:         {}", item.url);
            println!("State:       {}", state_name(item.state));
            println!("DtEstimate:  {}", fmt_time(item.dt_estimate));
            println!("DtCompleted: {}", fmt_time(item.dt_completed));
            println!("Created:     {}", fmt_time(Some(item.created)));
            println!("Modified:    {}", fmt_time(Some(item.modified)));
        }
        None => println!("no such item"),
    }
    Ok(())
}

pub async fn update(
    client: &CliClient,
    sid: Sid,
    priority: Option<i32>,
    description: Option<String>,
    url: Option<String>,
) -> Result<(), CliError> {
    let mut request = UpdateItemRequest::empty(sid);
    if let Some(priority) = priority {
        request.priority = priority;
    }
    if let Some(description) = description {
        request.description = description;
    }
    if let Some(url) = url {
        request.url = url;
    }

    let envelope = Envelope::with_data("UpdateItem", &client.username, &request)?;
    client.send(&envelope).await?;
    println!("Updated SID {sid}");
    Ok(())
}

pub async fn delete(client: &CliClient, sid: Sid) -> Result<(), CliError> {
    let envelope = Envelope::with_data("DeleteItem", &client.username, &SidRequest { sid })?;
    client.send(&envelope).await?;
    println!("Deleted SID {sid}");
    Ok(())
}

pub async fn redo(client: &CliClient, sid: Sid) -> Result<(), CliError> {
    let request = RebookRequest {
        sid,
        machine_id: String::new(),
    };
    let envelope = Envelope::with_data("Redo", &client.username, &request)?;
    client.send(&envelope).await?;
    println!("Re-queued SID {sid}");
    Ok(())
}

pub async fn agent_status(client: &CliClient, agent_url: &str) -> Result<(), CliError> {
    let url = format!("{}/Status", agent_url.trim_end_matches('/'));
    let reply = client.get_agent(&url).await?;
    println!("Program started:         {}", reply["ProgramStarted"]);
    println!("Simulations in progress: {}", reply["SimulationsInProgress"]);
    println!("Paused:                  {}", reply["Paused"]);
    println!("Max simulations:         {}", reply["MaxSimulations"]);
    Ok(())
}

pub async fn shutdown(client: &CliClient) -> Result<(), CliError> {
    let reply = client.send(&Envelope::new("Shutdown", &client.username)).await?;
    println!("{}", reply["Message"].as_str().unwrap_or("Shutting down"));
    Ok(())
}

fn print_queue(reply: &serde_json::Value) -> Result<(), CliError> {
    let items: Vec<QueueItem> =
        serde_json::from_value(reply["Data"].clone()).unwrap_or_default();
    if items.is_empty() {
        println!("queue is empty");
        return Ok(());
    }

    println!(
        "{:>6}  {:<20}  {:>8}  {:<12}  {:<19}  {:<19}  {}",
        "SID", "Name", "Priority", "State", "Estimate", "Completed", "Machine"
    );
    for item in items {
        println!(
            "{:>6}  {:<20}  {:>8}  {:<12}  {:<19}  {:<19}  {}",
            item.sid,
            truncate(&item.name, 20),
            item.priority,
            state_name(item.state),
            fmt_time(item.dt_estimate),
            fmt_time(item.dt_completed),
            item.machine_id,
        );
    }
    Ok(())
}

fn fmt_time(value: Option<Timestamp>) -> String {
    match value {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let kept: String = s.chars().take(width.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}
