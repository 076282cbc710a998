use crate::registry::RoomRegistry;
use lenscast_core::ConsoleCommand;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const CLEAR_REASON: &str = "Server clearing all rooms";

/// Run an operator command and render its report.
pub async fn execute_command(registry: &RoomRegistry, command: ConsoleCommand) -> String {
    match command {
        ConsoleCommand::People => people_report(registry),
        ConsoleCommand::Clear => {
            let report = registry.clear(CLEAR_REASON).await;
            format!(
                "Cleared {} rooms and disconnected {} users",
                report.rooms, report.participants
            )
        }
    }
}

/// Rooms-and-users report in the operator console format.
pub fn people_report(registry: &RoomRegistry) -> String {
    let snapshot = registry.snapshot();
    let mut report = String::from("\n=== Current Rooms and Users ===\n");
    if snapshot.is_empty() {
        report.push_str("No active rooms");
        return report;
    }

    let mut total_users = 0;
    for (room, members) in &snapshot {
        total_users += members.len();
        report.push_str(&format!("\nRoom {room}:\n"));
        for member in members {
            let streams = if member.streams.is_empty() {
                String::from("no streams")
            } else {
                member
                    .streams
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            report.push_str(&format!("  {} ({streams})\n", member.participant));
        }
        report.push_str(&format!("Total users in room: {}\n", members.len()));
    }
    report.push_str(&format!("\nTotal rooms: {}\n", snapshot.len()));
    report.push_str(&format!("Total users: {total_users}"));
    report
}

/// Stdin console for the server operator: `people`, `clear`, `help`.
pub async fn run_console(registry: Arc<RoomRegistry>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input.parse::<ConsoleCommand>() {
            Ok(command) => {
                let report = execute_command(&registry, command).await;
                println!("{report}");
            }
            Err(_) if input.eq_ignore_ascii_case("help") => {
                println!("\nAvailable commands:");
                println!("people - Show all rooms and users");
                println!("clear  - Disconnect all users and clear all rooms");
                println!("help   - Show this help message");
            }
            Err(_) => println!("Unknown command. Type \"help\" for available commands"),
        }
    }
    info!("console input closed");
}
