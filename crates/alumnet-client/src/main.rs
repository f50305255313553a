//! # alumnet-chat
//!
//! Terminal front end for the alumni direct-messaging service. Reads
//! commands from stdin (see `/help`), prints conversation traffic and
//! notices to stdout.

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

use alumnet_client_lib::api::HttpChatApi;
use alumnet_client_lib::commands::{Command, HELP};
use alumnet_client_lib::config::ClientConfig;
use alumnet_client_lib::live;
use alumnet_client_lib::session::ChatSession;
use alumnet_client_lib::snapshot::SnapshotStore;
use alumnet_client_lib::state::CacheState;
use alumnet_shared::types::UserId;

type Session = ChatSession<HttpChatApi>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    alumnet_client_lib::init_tracing();

    let config = ClientConfig::from_env();
    info!(server = %config.server_url, "Starting alumnet chat v{}", env!("CARGO_PKG_VERSION"));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let user = match config.user_id.clone() {
        Some(user) => user,
        None => match prompt_user(&mut lines).await? {
            Some(user) => user,
            None => return Ok(()),
        },
    };

    let store = match config.data_dir {
        Some(ref dir) => SnapshotStore::at(dir),
        None => SnapshotStore::new()?,
    };

    let api = HttpChatApi::new(&config.server_url)?;
    let mut session = ChatSession::new(api, user.clone());

    match session.resume(&store) {
        Ok(true) => println!("* restored previous session"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "could not restore session, starting fresh"),
    }

    let (live, mut live_events, live_task) = live::spawn(&config, &user)?;
    session.attach_live(live);

    if let Err(e) = session.refresh_partners().await {
        println!("! could not load partners: {e}");
    }
    println!("Signed in as {user}. Type /help for commands.");

    let mut logged_out = false;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match run_command(&mut session, &store, Command::parse(&line)).await {
                    Flow::Continue => {}
                    Flow::Quit => break,
                    Flow::LoggedOut => {
                        logged_out = true;
                        break;
                    }
                }
            }
            Some(event) = live_events.recv() => {
                if let Some(notice) = session.handle_event(event) {
                    println!("{notice}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    if !logged_out {
        if let Err(e) = session.save(&store) {
            warn!(error = %e, "failed to save session");
        }
    }

    // Dropping the session drops the last live sender and ends the supervisor.
    drop(session);
    if tokio::time::timeout(std::time::Duration::from_secs(2), live_task)
        .await
        .is_err()
    {
        warn!("live channel did not close in time");
    }

    Ok(())
}

enum Flow {
    Continue,
    Quit,
    LoggedOut,
}

async fn prompt_user(lines: &mut Lines<BufReader<Stdin>>) -> anyhow::Result<Option<UserId>> {
    loop {
        println!("user id:");
        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        let line = line.trim();
        if !line.is_empty() {
            return Ok(Some(UserId::from(line)));
        }
    }
}

async fn run_command(session: &mut Session, store: &SnapshotStore, command: Command) -> Flow {
    match command {
        Command::Empty => {}
        Command::Help => println!("{HELP}"),
        Command::Unknown(line) => println!("! unknown command: {line} (try /help)"),

        Command::Users => match session.refresh_partners().await {
            Ok(_) => {
                for partner in session.partners() {
                    let state = session.state();
                    let marker = if state.is_online(&partner.id) { "●" } else { "○" };
                    let unread = state.unread_count(&partner.id);
                    let badge = if unread > 0 { format!(" ({unread})") } else { String::new() };
                    println!("{marker} {} [{}]{badge}", partner.full_name, partner.id);
                }
            }
            Err(e) => println!("! could not load partners: {e}"),
        },

        Command::Open(counterpart) => {
            let cache = session.select_conversation(counterpart.clone());
            println!("--- {} ---", session.partner_name(&counterpart));
            // A loaded cache is shown immediately and refreshed behind it.
            if cache == CacheState::Loaded {
                print_conversation(session, &counterpart);
            }
            match session.load_history(&counterpart).await {
                Ok(true) if cache == CacheState::Empty => print_conversation(session, &counterpart),
                Ok(_) => {}
                Err(e) => println!("! could not load history: {e}"),
            }
        }

        Command::Online => {
            let online = session.state().online();
            if online.is_empty() {
                println!("* nobody online");
            }
            for user in online {
                println!("● {} [{user}]", session.partner_name(user));
            }
        }

        Command::Unread => {
            let state = session.state();
            println!("* {} unread", state.total_unread());
            for (user, count) in state.unread_counterparts() {
                println!("  {} [{user}]: {count}", session.partner_name(&user));
            }
        }

        Command::Read(counterpart) => match session.mark_read(counterpart) {
            Ok(user) => println!("* {} marked read", session.partner_name(&user)),
            Err(e) => println!("! {e}"),
        },

        Command::Notify(setting) => {
            let enabled = setting.unwrap_or(!session.notifications_enabled());
            session.set_notifications(enabled);
            println!("* notifications {}", if enabled { "on" } else { "off" });
        }

        Command::Send(text) => {
            if let Err(e) = session.send(&text).await {
                println!("! not sent: {e}");
            }
        }

        Command::Logout => {
            if let Err(e) = session.logout(store) {
                warn!(error = %e, "failed to clear session snapshot");
            }
            println!("* logged out");
            return Flow::LoggedOut;
        }

        Command::Quit => return Flow::Quit,
    }
    Flow::Continue
}

fn print_conversation(session: &Session, counterpart: &UserId) {
    for message in session.state().messages(counterpart) {
        let who = if &message.sender_id == session.viewer() {
            "me"
        } else {
            session.partner_name(&message.sender_id)
        };
        println!("[{}] {who}: {}", message.created_at.format("%H:%M"), message.content);
    }
}
