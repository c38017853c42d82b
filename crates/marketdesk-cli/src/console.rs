//! Command parsing and the interactive console loop.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error};

use marketdesk_core::{AuthState, Route};

use crate::app::App;

pub const HELP: &str = "\
Commands:
  login [username]     Log in (password is prompted)
  logout               End the session
  status               Show who is logged in
  refresh              Renew the access token
  open <view> [page]   Open a view: dashboard, businesses, professionals,
                       ads, users, roles, reports, notifications
  <view> [page]        Shorthand for open
  help                 Show this help
  quit                 Leave the console";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login(Option<String>),
    Logout,
    Status,
    Refresh,
    Open(Route, u32),
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let command = match head.to_lowercase().as_str() {
            "login" => Command::Login(rest.first().map(|s| s.to_string())),
            "logout" => Command::Logout,
            "status" | "whoami" => Command::Status,
            "refresh" => Command::Refresh,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "open" => {
                let view = rest.first().ok_or("Usage: open <view> [page]")?;
                Command::Open(view.parse()?, parse_page(rest.get(1))?)
            }
            other => {
                let route: Route = other.parse()?;
                Command::Open(route, parse_page(rest.first())?)
            }
        };
        Ok(Some(command))
    }
}

fn parse_page(arg: Option<&&str>) -> Result<u32, String> {
    match arg {
        None => Ok(1),
        Some(s) => s
            .parse::<u32>()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| format!("Invalid page: {}", s)),
    }
}

/// Run one command. Returns false when the console should exit.
pub async fn execute(app: &mut App, command: Command, may_prompt: bool) -> Result<bool> {
    match command {
        Command::Login(identifier) => app.login(identifier, may_prompt).await?,
        Command::Logout => app.logout().await,
        Command::Status => println!("{}", app.status()),
        Command::Refresh => app.refresh().await?,
        Command::Open(route, page) => app.open(route, page).await?,
        Command::Help => println!("{}", HELP),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

/// Interactive loop. The expiry monitor runs alongside and any forced logout
/// is announced as soon as it happens.
pub async fn run(app: &mut App) -> Result<()> {
    let monitor = app.session.spawn_expiry_monitor(app.config.check_interval());
    let mut states = app.session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    app.print_notice();
    println!("{}", app.status());
    println!("Type `help` for commands.");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Command::parse(&line) {
                    Ok(Some(command)) => match execute(app, command, false).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            error!(error = %e, "Command failed");
                            println!("Error: {}", e);
                        }
                    },
                    Ok(None) => {}
                    Err(message) => println!("{}", message),
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                debug!(?state, "Session state changed");
                if state == AuthState::LoggedOut {
                    app.print_notice();
                }
            }
        }
    }

    monitor.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketdesk_core::Resource;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("").unwrap(), None);
        assert_eq!(Command::parse("  logout ").unwrap(), Some(Command::Logout));
        assert_eq!(
            Command::parse("login admin").unwrap(),
            Some(Command::Login(Some("admin".to_string())))
        );
        assert_eq!(Command::parse("LOGIN").unwrap(), Some(Command::Login(None)));
        assert_eq!(Command::parse("exit").unwrap(), Some(Command::Quit));
    }

    #[test]
    fn test_parse_open() {
        assert_eq!(
            Command::parse("open ads 3").unwrap(),
            Some(Command::Open(Route::Resource(Resource::Ads), 3))
        );
        assert_eq!(
            Command::parse("users").unwrap(),
            Some(Command::Open(Route::Resource(Resource::Users), 1))
        );
        assert_eq!(
            Command::parse("dashboard").unwrap(),
            Some(Command::Open(Route::Dashboard, 1))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("open").is_err());
        assert!(Command::parse("open ads 0").is_err());
        assert!(Command::parse("open ads two").is_err());
        assert!(Command::parse("frobnicate").is_err());
    }
}
