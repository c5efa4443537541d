//! Line-oriented terminal front end.
//!
//! Queries and web searches run as spawned tasks and report back over a
//! channel, so the prompt stays usable while they are in flight.

pub mod commands;
pub mod render;

use std::str::FromStr;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncWriteExt, Lines};
use tokio::sync::mpsc;

use crate::chat::message::Role;
use crate::chat::{
    ChatController, HistoryOutcome, QueryMode, SubmitOutcome, SubmitRejection,
    WebSearchOutcome, WebSearchRejection,
};

use commands::Command;

const LOGIN_ATTEMPTS: usize = 3;
const BUSY: &str = "still waiting for the previous answer";

enum Completion {
    Submitted(SubmitOutcome),
    Searched {
        message_id: String,
        outcome: WebSearchOutcome,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct Repl {
    controller: ChatController,
    username: Option<String>,
    password: Option<String>,
    history_limit: u32,
    /// Messages already printed, by position.
    printed: usize,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl Repl {
    pub fn new(
        controller: ChatController,
        username: Option<String>,
        password: Option<String>,
        history_limit: u32,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            controller,
            username,
            password,
            history_limit,
            printed: 0,
            tx,
            rx,
        }
    }

    pub async fn run<R>(&mut self, mut lines: Lines<R>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let state = self.controller.snapshot();
        println!("{}", render::health(state.health()));
        println!(
            "{}",
            render::notice(&format!(
                "mode: {} ({}). /help for commands.",
                state.query_mode(),
                state.query_mode().label()
            ))
        );

        if !self.controller.session().is_authenticated() {
            self.login(&mut lines).await?;
        }

        loop {
            prompt().await;
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if self.handle_line(&line, &mut lines).await? == Flow::Quit {
                        break;
                    }
                }
                Some(done) = self.rx.recv() => {
                    self.on_completion(done, &mut lines).await?;
                }
            }
        }

        Ok(())
    }

    async fn handle_line<R>(&mut self, line: &str, lines: &mut Lines<R>) -> Result<Flow>
    where
        R: AsyncBufRead + Unpin,
    {
        match commands::parse(line) {
            Command::None => {}
            Command::Ask(text) => self.spawn_submission(text),
            Command::Mode(None) => {
                println!("{}", render::modes(self.controller.snapshot().query_mode()))
            }
            Command::Mode(Some(name)) => match QueryMode::from_str(&name) {
                Ok(mode) => {
                    self.controller.set_query_mode(mode);
                    println!("{}", render::notice(&format!("mode: {} ({})", mode, mode.label())));
                }
                Err(err) => println!("{}", render::error_banner(&err.to_string())),
            },
            Command::Web(number) => self.spawn_web_search(number),
            Command::Sources(number) => self.toggle_sources(number),
            Command::Filters => match self.controller.load_filters().await {
                Ok(options) => print!("{}", render::filters(&options)),
                Err(err) if err.is_authentication() => self.login_again(lines).await?,
                Err(err) => println!("{}", render::error_banner(&err.user_message())),
            },
            Command::History(limit) => {
                let limit = limit.unwrap_or(self.history_limit);
                match self.controller.load_history(limit).await {
                    HistoryOutcome::Restored(count) => {
                        self.printed = 0;
                        println!("{}", render::notice(&format!("{} stored exchanges", count)));
                        self.print_new(true);
                    }
                    HistoryOutcome::Busy => println!("{}", render::notice(BUSY)),
                    HistoryOutcome::Failed(text) => println!("{}", render::error_banner(&text)),
                    HistoryOutcome::LoggedOut => self.login_again(lines).await?,
                }
            }
            Command::Delete(id) => match self.controller.delete_stored_message(&id).await {
                Ok(deleted) => println!(
                    "{}",
                    render::notice(&format!("deleted {} ({})", deleted.message_id, deleted.status))
                ),
                Err(err) if err.is_authentication() => self.login_again(lines).await?,
                Err(err) => println!("{}", render::error_banner(&err.user_message())),
            },
            Command::Health => {
                let indicator = self.controller.check_health().await;
                println!("{}", render::health(&indicator));
            }
            Command::Clear => {
                if self.controller.clear_history() {
                    self.printed = 0;
                    println!("{}", render::notice("conversation cleared"));
                } else {
                    println!("{}", render::notice(BUSY));
                }
            }
            Command::Login => self.login(lines).await?,
            Command::Logout => {
                if self.controller.logout() {
                    println!("{}", render::notice("logged out"));
                } else {
                    println!("{}", render::notice("not logged in"));
                }
            }
            Command::Help => println!("{}", render::help()),
            Command::Quit => return Ok(Flow::Quit),
            Command::Usage(usage) => println!("{} {}", render::notice("usage:"), usage),
            Command::Unknown(line) => {
                println!("{}", render::error_banner(&format!("unknown command {}", line)));
                println!("{}", render::help());
            }
        }
        Ok(Flow::Continue)
    }

    fn spawn_submission(&self, text: String) {
        let controller = self.controller.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = controller.submit_query(text).await;
            let _ = tx.send(Completion::Submitted(outcome));
        });
    }

    fn spawn_web_search(&self, number: Option<usize>) {
        let state = self.controller.snapshot();
        let target = match number {
            Some(n) => state.messages().get(n - 1),
            None => state.latest_web_search_candidate(),
        };
        let Some(message) = target else {
            println!("{}", render::notice("no answer to enrich"));
            return;
        };

        let message_id = message.id.clone();
        println!("{}", render::notice("searching the web..."));
        let controller = self.controller.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = controller.request_web_search(&message_id).await;
            let _ = tx.send(Completion::Searched {
                message_id,
                outcome,
            });
        });
    }

    fn toggle_sources(&self, number: usize) {
        let state = self.controller.snapshot();
        let Some(message) = state.messages().get(number - 1) else {
            println!("{}", render::notice("no such message"));
            return;
        };
        self.controller.toggle_sources(message.id.clone());
        let expanded = !state.is_expanded(&message.id);
        print!("{}", render::message(number, message, expanded));
    }

    async fn on_completion<R>(&mut self, done: Completion, lines: &mut Lines<R>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        match done {
            Completion::Submitted(SubmitOutcome::Answered(_)) => self.print_new(false),
            Completion::Submitted(SubmitOutcome::Rejected(reason)) => {
                let text = match reason {
                    SubmitRejection::EmptyInput => "nothing to send",
                    SubmitRejection::Busy => BUSY,
                    SubmitRejection::BackendUnreachable => {
                        "backend unreachable, try /health once it is back"
                    }
                };
                println!("{}", render::notice(text));
            }
            Completion::Submitted(SubmitOutcome::Failed(text)) => {
                println!("{}", render::error_banner(&text))
            }
            Completion::Submitted(SubmitOutcome::LoggedOut) => self.login_again(lines).await?,
            Completion::Searched {
                message_id,
                outcome,
            } => match outcome {
                WebSearchOutcome::Enriched => self.print_message(&message_id),
                WebSearchOutcome::Rejected(reason) => {
                    let text = match reason {
                        WebSearchRejection::NotFound => "no such message",
                        WebSearchRejection::NotEligible => "this answer cannot be enriched",
                        WebSearchRejection::AlreadyLoading => "web search already running",
                    };
                    println!("{}", render::notice(text));
                }
                WebSearchOutcome::Failed(_) => self.print_message(&message_id),
                WebSearchOutcome::LoggedOut => self.login_again(lines).await?,
            },
        }
        Ok(())
    }

    /// Prints messages appended since the last call. User echoes are
    /// skipped unless `include_user` is set.
    fn print_new(&mut self, include_user: bool) {
        let state = self.controller.snapshot();
        for (index, message) in state.messages().iter().enumerate().skip(self.printed) {
            if include_user || message.role != Role::User {
                print!(
                    "{}",
                    render::message(index + 1, message, state.is_expanded(&message.id))
                );
            }
        }
        self.printed = state.messages().len();
    }

    fn print_message(&self, message_id: &str) {
        let state = self.controller.snapshot();
        if let Some(index) = state.messages().iter().position(|m| m.id == message_id) {
            let message = &state.messages()[index];
            print!(
                "{}",
                render::message(index + 1, message, state.is_expanded(message_id))
            );
        }
    }

    async fn login_again<R>(&mut self, lines: &mut Lines<R>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        println!(
            "{}",
            render::error_banner("Your session has expired. Please log in again.")
        );
        self.login(lines).await
    }

    async fn login<R>(&mut self, lines: &mut Lines<R>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        for _ in 0..LOGIN_ATTEMPTS {
            let username = match self.username.clone() {
                Some(name) => name,
                None => match ask("Username: ", lines).await? {
                    Some(name) if !name.trim().is_empty() => name.trim().to_string(),
                    Some(_) => continue,
                    None => return Ok(()),
                },
            };
            // An environment-supplied password is only tried once.
            let password = match self.password.take() {
                Some(password) => password,
                None => match ask("Password: ", lines).await? {
                    Some(password) => password,
                    None => return Ok(()),
                },
            };

            match self.controller.login(&username, &password).await {
                Ok(user) => {
                    self.username = Some(user.username.clone());
                    println!("{}", render::notice(&format!("logged in as {}", user.username)));
                    return Ok(());
                }
                Err(err) => {
                    println!("{}", render::error_banner(&err.user_message()));
                    self.username = None;
                }
            }
        }
        println!("{}", render::notice("continuing without a session; /login to retry"));
        Ok(())
    }
}

async fn prompt() {
    let mut stdout = tokio::io::stdout();
    let _ = stdout.write_all(b"> ").await;
    let _ = stdout.flush().await;
}

async fn ask<R>(label: &str, lines: &mut Lines<R>) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;
    Ok(lines.next_line().await?)
}
