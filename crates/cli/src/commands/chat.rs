use anyhow::Result;
use flightdesk_agent::AgentRuntime;
use flightdesk_core::config::{AppConfig, LoadOptions, LogFormat};
use flightdesk_core::domain::session::SessionId;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::commands::CommandResult;

const PROMPT: &str = "you> ";
const QUIT_WORDS: [&str; 3] = ["/quit", "/exit", ":q"];

pub fn run(session: Option<String>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("chat", "config_validation", error.to_string(), 2),
    };
    init_logging(&config);

    let session_id = match session.as_deref().map(SessionId::parse).transpose() {
        Ok(id) => id.unwrap_or_else(SessionId::generate),
        Err(message) => return CommandResult::failure("chat", "invalid_session", message, 2),
    };

    let agent = match AgentRuntime::from_config(&config) {
        Ok(agent) => agent,
        Err(error) => {
            return CommandResult::failure("chat", "runtime_wiring", format!("{error:#}"), 3)
        }
    };

    let tokio_runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                4,
            )
        }
    };

    let outcome = tokio_runtime.block_on(async {
        let mut stdout = io::stdout();
        stdout
            .write_all(format!("session {session_id} (type /quit to leave)\n").as_bytes())
            .await?;
        converse(&agent, &session_id, BufReader::new(io::stdin()), stdout).await
    });

    match outcome {
        Ok(turns) => CommandResult::success(
            "chat",
            format!("session {session_id} closed after {turns} turn(s)"),
        ),
        Err(error) => CommandResult::failure("chat", "io", format!("{error:#}"), 5),
    }
}

/// Drives one conversation until input ends, a quit word is typed, or the
/// assistant ends the session. Returns the number of user turns handled.
pub async fn converse<R, W>(
    agent: &AgentRuntime,
    session_id: &SessionId,
    input: R,
    mut output: W,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut turns = 0;

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if QUIT_WORDS.contains(&text) {
            break;
        }

        turns += 1;
        match agent.handle_user_message(session_id, text).await {
            Ok(turn) => {
                output.write_all(format!("agent> {}\n", turn.reply).as_bytes()).await?;
                if turn.ended {
                    break;
                }
            }
            Err(error) => {
                let interface = error.into_interface(session_id.as_str());
                output
                    .write_all(format!("agent> {}\n", interface.user_message()).as_bytes())
                    .await?;
            }
        }
    }

    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(turns)
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::WARN);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use flightdesk_agent::AgentRuntime;
    use flightdesk_core::config::AppConfig;
    use flightdesk_core::domain::session::SessionId;

    use super::converse;

    fn agent() -> AgentRuntime {
        AgentRuntime::from_config(&AppConfig::default()).expect("runtime")
    }

    #[tokio::test]
    async fn replies_to_each_line_until_quit() {
        let agent = agent();
        let input: &[u8] = b"Flights from Boston to Paris\n\n/quit\nignored\n";
        let mut output = Vec::new();

        let turns =
            converse(&agent, &SessionId::new("cli-1"), input, &mut output).await.expect("chat");

        let transcript = String::from_utf8(output).expect("utf8");
        assert_eq!(turns, 1);
        assert_eq!(transcript.matches("agent> ").count(), 1);
        assert!(transcript.contains("date"));
        assert!(agent.sessions().get(&SessionId::new("cli-1")).await.is_some());
    }

    #[tokio::test]
    async fn stops_at_end_of_input() {
        let agent = agent();
        let input: &[u8] = b"hello\n";
        let mut output = Vec::new();

        let turns =
            converse(&agent, &SessionId::new("cli-2"), input, &mut output).await.expect("chat");

        assert_eq!(turns, 1);
    }
}
