/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `session` - interactive avatar session
- `save`    - save a project without a session
- `extract` - document text extraction
- `embed`   - embed snippet of a published project
- `serve`   - document extraction proxy
- `login`   - stored credentials

The handlers are thin; the work happens in the library components.
*/

use crate::config::Config;
use crate::credentials::{resolve_bearer, CredentialStore, LoginRecord, ResolvedCredentials};
use crate::error::Result;
use crate::persistence::{HttpProjectStore, PersistenceGateway};
use std::path::Path;
use std::sync::Arc;

// Slash commands of the session REPL
pub mod special_commands;

/// Stored login, if any. A broken keyring is not fatal here.
fn stored_login() -> Option<LoginRecord> {
    match CredentialStore::default().load_login() {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read stored login");
            None
        }
    }
}

fn credentials(auth_token: Option<&str>) -> Result<ResolvedCredentials> {
    resolve_bearer(auth_token, stored_login().as_ref())
}

fn gateway(config: &Config, bearer: &str) -> Result<PersistenceGateway> {
    let store = HttpProjectStore::new(
        &config.api.base_url,
        bearer,
        config.api.request_timeout(),
    )?;
    Ok(PersistenceGateway::new(Arc::new(store)))
}

fn write_output(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            tracing::info!("Wrote {} bytes to {}", text.len(), path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

// Session command handler
pub mod session {
    //! Interactive session handler.
    //!
    //! Resolves the session configuration, builds a [`SessionController`]
    //! over the REST streaming adapter and runs a readline loop that turns
    //! each line into a controller call. Session events are printed by a
    //! background task as they arrive.

    use super::*;
    use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
    use crate::documents::DocumentExtractor;
    use crate::persistence::SaveNotice;
    use crate::project::ProjectDirectory;
    use crate::session::{
        InteractionMode, SessionConfig, SessionController, SessionEvent, TerminationReason,
    };
    use crate::streaming::rest::RestStreamingFactory;
    use crate::token::TokenProvider;
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::sync::{broadcast, oneshot};

    /// Arguments of `aihuman session`
    #[derive(Debug, Clone, Default)]
    pub struct SessionArgs {
        pub project: Option<PathBuf>,
        pub published: Option<String>,
        pub document: Option<PathBuf>,
        pub auth_token: Option<String>,
        pub no_timers: bool,
    }

    /// Start an interactive avatar session
    ///
    /// # Errors
    ///
    /// Fails when no project is given, the project cannot be loaded, or the
    /// session does not start. Errors after start are printed and the loop
    /// keeps going.
    pub async fn run_session(config: Config, args: SessionArgs) -> Result<()> {
        let credentials = credentials(args.auth_token.as_deref());
        if let Err(e) = &credentials {
            tracing::info!("Saving disabled: {}", e);
        }
        let credentials = credentials.ok();

        let mut session_config = resolve_project(&config, &args, credentials.as_ref()).await?;

        if let Some(path) = &args.document {
            let Some(creds) = credentials.as_ref() else {
                return Err(crate::error::SessionError::MissingCredentials(
                    "document extraction needs an auth token".to_string(),
                )
                .into());
            };
            let extractor = DocumentExtractor::new(&config.app.base_url, creds.bearer.clone())?;
            let text = extractor.extract_file(path).await?;
            println!(
                "{}",
                format!("Knowledge base loaded from {} ({} chars)", path.display(), text.len())
                    .cyan()
            );
            session_config = session_config.with_knowledge_base(text);
        }

        let mut settings = config.session.clone();
        // The REST adapter has no voice channel
        settings.initial_mode = InteractionMode::Text;
        if args.no_timers {
            settings.timers_enabled = false;
        }

        let tokens = TokenProvider::new(&config.app.base_url, config.token.policy())?;
        let factory = RestStreamingFactory::new(&config.streaming)?;
        let mut builder = SessionController::builder(Arc::new(tokens), Arc::new(factory))
            .settings(settings);
        if let Some(creds) = credentials.as_ref() {
            builder = builder.persistence(Arc::new(gateway(&config, &creds.bearer)?));
        }
        let controller = builder.build();

        let mut events = controller.subscribe();
        let printer = tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let Some(line) = describe_event(&event) {
                    println!("{}", line);
                }
            }
        });

        println!("{}", "Starting session...".cyan());
        if let Err(e) = controller.start(session_config.clone()).await {
            printer.abort();
            return Err(e);
        }

        print_welcome_banner(&session_config);
        repl(&controller).await?;

        controller.end(TerminationReason::User).await;
        controller.wait_for_auto_save().await;
        drop(controller);
        let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;

        println!("Goodbye!");
        Ok(())
    }

    async fn resolve_project(
        config: &Config,
        args: &SessionArgs,
        credentials: Option<&ResolvedCredentials>,
    ) -> Result<SessionConfig> {
        let entitlements = credentials.map(|c| c.entitlements).unwrap_or_default();

        if let Some(name) = &args.published {
            let directory = ProjectDirectory::new(&config.api.base_url)?;
            let project = directory.lookup(name).await?;
            return Ok(project.into_session_config(name, entitlements));
        }

        let Some(path) = &args.project else {
            return Err(crate::error::SessionError::Config(
                "either --project or --published is required".to_string(),
            )
            .into());
        };

        let mut session_config = SessionConfig::from_yaml_file(path)?;
        session_config.entitlements.top_tier |= entitlements.top_tier;
        session_config.entitlements.front_end |= entitlements.front_end;
        Ok(session_config)
    }

    /// Line editor running on its own thread
    ///
    /// `readline` blocks, so it stays off the runtime and the prompt can be
    /// raced against session events.
    struct LineReader {
        requests: std::sync::mpsc::Sender<(String, oneshot::Sender<rustyline::Result<String>>)>,
    }

    impl LineReader {
        fn spawn() -> Result<Self> {
            let (requests, rx) =
                std::sync::mpsc::channel::<(String, oneshot::Sender<rustyline::Result<String>>)>();

            std::thread::Builder::new()
                .name("aihuman-readline".to_string())
                .spawn(move || {
                    let mut rl = match DefaultEditor::new() {
                        Ok(rl) => rl,
                        Err(e) => {
                            if let Ok((_, reply)) = rx.recv() {
                                let _ = reply.send(Err(e));
                            }
                            return;
                        }
                    };

                    while let Ok((prompt, reply)) = rx.recv() {
                        let line = rl.readline(&prompt);
                        if let Ok(line) = &line {
                            let trimmed = line.trim();
                            if !trimmed.is_empty() {
                                let _ = rl.add_history_entry(trimmed);
                            }
                        }
                        if reply.send(line).is_err() {
                            break;
                        }
                    }
                })?;

            Ok(Self { requests })
        }

        /// Next line, or `None` once the editor thread is gone
        async fn readline(&self, prompt: String) -> Option<rustyline::Result<String>> {
            let (reply, rx) = oneshot::channel();
            self.requests.send((prompt, reply)).ok()?;
            rx.await.ok()
        }
    }

    /// Resolves once the session publishes `Ended`
    async fn session_ended(events: &mut broadcast::Receiver<SessionEvent>) {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Ended { .. }) | Err(broadcast::error::RecvError::Closed) => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            }
        }
    }

    async fn repl(controller: &SessionController) -> Result<()> {
        let reader = LineReader::spawn()?;
        let mut events = controller.subscribe();

        loop {
            if controller.state().await.is_terminal() {
                break;
            }

            let prompt = format!("{} ", "[session]>".green());
            let pending = reader.readline(prompt);
            tokio::pin!(pending);

            let line = tokio::select! {
                line = &mut pending => line,
                _ = session_ended(&mut events) => {
                    controller.wait_for_auto_save().await;
                    // The editor owns the terminal until its line completes
                    let _ = pending.await;
                    break;
                }
            };

            match line {
                None => break,
                Some(Ok(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    if controller.state().await.is_terminal() {
                        break;
                    }

                    let command = match parse_special_command(trimmed) {
                        Ok(command) => command,
                        Err(e) => {
                            eprintln!("{}", e.to_string().red());
                            continue;
                        }
                    };

                    if !dispatch(controller, command).await {
                        break;
                    }
                }
                Some(Err(ReadlineError::Interrupted)) => {
                    println!("CTRL-C");
                    break;
                }
                Some(Err(ReadlineError::Eof)) => {
                    println!("CTRL-D");
                    break;
                }
                Some(Err(err)) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Runs one command; `false` leaves the loop
    async fn dispatch(controller: &SessionController, command: SpecialCommand) -> bool {
        let outcome = match command {
            SpecialCommand::Speak(text) => controller.speak(&text).await,
            SpecialCommand::Interrupt => controller.interrupt().await,
            SpecialCommand::SwitchMode(mode) => controller.set_mode(mode).await,
            SpecialCommand::Record => controller.start_voice_capture().await,
            SpecialCommand::Send => controller.stop_voice_capture().await,
            SpecialCommand::Save => match controller.save().await {
                Ok(notice) => {
                    print_notice(notice);
                    return false;
                }
                Err(e) => Err(e),
            },
            SpecialCommand::ShowStatus => {
                print_status_display(controller).await;
                Ok(())
            }
            SpecialCommand::Help => {
                print_help();
                Ok(())
            }
            SpecialCommand::Exit => return false,
        };

        if let Err(e) = outcome {
            eprintln!("{}", format!("Error: {}", e).red());
        }
        true
    }

    fn print_notice(notice: SaveNotice) {
        println!("{}", notice.message().green());
    }

    /// One line per user-visible event
    pub(crate) fn describe_event(event: &SessionEvent) -> Option<String> {
        match event {
            SessionEvent::Started { session_id } => {
                Some(format!("Session {} is live", session_id).green().to_string())
            }
            SessionEvent::AvatarTalking(true) => Some("avatar is speaking...".dimmed().to_string()),
            SessionEvent::ModeChanged(mode) => {
                Some(format!("Switched to {} mode", mode).cyan().to_string())
            }
            SessionEvent::CaptureChanged(true) => {
                Some("Recording; type /send to send".yellow().to_string())
            }
            SessionEvent::Notice(notice) => Some(notice.message().green().to_string()),
            SessionEvent::Ended { reason } => Some(match reason {
                TerminationReason::User => "Session ended".cyan().to_string(),
                TerminationReason::SoftTimeout | TerminationReason::HardTimeout => {
                    "Time is up; the session has ended. Press Enter to exit."
                        .yellow()
                        .to_string()
                }
                TerminationReason::RemoteDisconnect => {
                    "The avatar disconnected. Press Enter to exit."
                        .red()
                        .to_string()
                }
            }),
            SessionEvent::StreamReady
            | SessionEvent::AvatarTalking(false)
            | SessionEvent::UserTalking(_)
            | SessionEvent::CaptureChanged(false) => None,
        }
    }

    fn print_welcome_banner(config: &SessionConfig) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                 AI Human Session - Welcome!                  ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        if !config.project_name.is_empty() {
            println!("Project: {}", config.project_name.bold());
        }
        println!("Avatar:  {}", config.avatar_id);
        println!("\nType to talk, '/help' for commands, 'exit' to quit\n");
    }

    async fn print_status_display(controller: &SessionController) {
        let snapshot = controller.snapshot().await;

        println!("\nState:      {}", snapshot.state);
        println!("Mode:       {}", snapshot.mode);
        if let Some(id) = &snapshot.session_id {
            println!("Session ID: {}", id);
        }
        if let Some(started) = snapshot.started_at {
            println!("Started:    {}", started.format("%H:%M:%S"));
        }
        match controller.timer_state().await {
            Some(timer) => println!("Remaining:  {}", timer.countdown()),
            None => println!("Remaining:  no limit"),
        }
        println!();
    }

}

// Save command handler
pub mod save {
    use super::*;
    use crate::persistence::SaveKind;
    use crate::session::SessionConfig;

    /// Save the project in `project` without starting a session
    pub async fn run_save(config: Config, project: &Path, auth_token: Option<String>) -> Result<()> {
        let session_config = SessionConfig::from_yaml_file(project)?;
        let creds = credentials(auth_token.as_deref())?;

        let notice = gateway(&config, &creds.bearer)?
            .save(&session_config, SaveKind::Manual)
            .await?;
        println!("{}", notice);
        Ok(())
    }
}

// Extract command handler
pub mod extract {
    use super::*;
    use crate::documents::DocumentExtractor;

    /// Extract the text of `file` through the proxy of the web application
    pub async fn run_extract(
        config: Config,
        file: &Path,
        auth_token: Option<String>,
        output: Option<&Path>,
    ) -> Result<()> {
        let creds = credentials(auth_token.as_deref())?;
        let extractor = DocumentExtractor::new(&config.app.base_url, creds.bearer)?;
        let text = extractor.extract_file(file).await?;
        write_output(&text, output)
    }
}

// Embed command handler
pub mod embed {
    use super::*;
    use crate::embed::{embed_snippet, preview_url, EmbedOptions};

    /// Text printed by `aihuman embed`
    pub fn render(config: &Config, project_name: &str, preview: bool) -> Result<String> {
        if preview {
            Ok(preview_url(&config.app.base_url, project_name)?.to_string())
        } else {
            embed_snippet(&config.app.base_url, project_name, &EmbedOptions::default())
        }
    }

    pub fn run_embed(config: Config, project_name: &str, preview: bool) -> Result<()> {
        println!("{}", render(&config, project_name, preview)?);
        Ok(())
    }

}

// Serve command handler
pub mod serve {
    use super::*;

    /// Serve the document extraction proxy
    pub async fn run_serve(mut config: Config, bind: Option<String>) -> Result<()> {
        if let Some(bind) = bind {
            config.server.bind = bind;
            config.validate()?;
        }
        crate::server::serve(&config).await
    }
}

// Login command handler
pub mod login {
    use super::*;
    use colored::Colorize;

    /// What `aihuman login` should do
    #[derive(Debug, Clone, PartialEq)]
    pub enum LoginAction {
        Store(LoginRecord),
        Clear,
        Show,
    }

    /// Maps the flags onto an action; a record file must be valid JSON
    pub fn action(token: Option<String>, record: Option<&Path>, clear: bool) -> Result<LoginAction> {
        if clear {
            return Ok(LoginAction::Clear);
        }
        if let Some(path) = record {
            let json = std::fs::read_to_string(path)?;
            let record: LoginRecord = serde_json::from_str(&json)?;
            return Ok(LoginAction::Store(record));
        }
        Ok(match token {
            Some(token) => LoginAction::Store(LoginRecord {
                token,
                user: None,
            }),
            None => LoginAction::Show,
        })
    }

    pub fn run_login(token: Option<String>, record: Option<&Path>, clear: bool) -> Result<()> {
        let store = CredentialStore::default();

        match action(token, record, clear)? {
            LoginAction::Clear => {
                store.clear_login()?;
                println!("Stored login removed");
            }
            LoginAction::Store(record) => {
                store.save_login(&record)?;
                println!("{}", "Login stored in the system keyring".green());
            }
            LoginAction::Show => match store.load_login()? {
                Some(record) if !record.token.trim().is_empty() => {
                    let entitlements = record.entitlements();
                    println!("Signed in");
                    println!(
                        "Extended sessions: {}",
                        if entitlements.top_tier { "yes" } else { "no" }
                    );
                }
                _ => println!("Not signed in"),
            },
        }
        Ok(())
    }

}
