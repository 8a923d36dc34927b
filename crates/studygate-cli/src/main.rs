//! studygate - command-line front-end for the session and entitlement core.
//!
//! Restores the session from durable storage, runs the same validation a
//! protected screen would, and reports what the screen would do.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use studygate_core::{
    can_generate, ApiClient, Config, CredentialStore, GenerationKind, GuardDecision,
    IdentityProvider, Navigator, RouteGuard, SecureTokenIdentity, SessionStore, SessionValidator,
};

const USAGE: &str = "\
Usage: studygate <command>

Commands:
  status                         Validate the stored session and report the outcome
  retry                          Like status, retrying once if rate limited
  can-generate <flashcard|quiz> <n>
                                 Check whether the signed-in user can generate n items
  login-token                    Sign in with an identity refresh token (read from the terminal)
  logout                         Clear the stored session";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Status,
    Retry,
    CanGenerate { kind: GenerationKind, quantity: u32 },
    LoginToken,
    Logout,
    Help,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let command = match args.get(1).map(String::as_str) {
            None | Some("status") => Command::Status,
            Some("retry") => Command::Retry,
            Some("can-generate") => {
                let (Some(kind), Some(quantity)) = (args.get(2), args.get(3)) else {
                    anyhow::bail!("can-generate needs a kind and a quantity\n\n{}", USAGE);
                };
                Command::CanGenerate {
                    kind: kind.parse().map_err(anyhow::Error::msg)?,
                    quantity: quantity
                        .parse()
                        .with_context(|| format!("Invalid quantity: {}", quantity))?,
                }
            }
            Some("login-token") => Command::LoginToken,
            Some("logout") => Command::Logout,
            Some("-h" | "--help" | "help") => Command::Help,
            Some(other) => anyhow::bail!("Unknown command: {}\n\n{}", other, USAGE),
        };
        Ok(command)
    }
}

/// Initialize the tracing subscriber for logging.
/// Set STUDYGATE_LOG_DIR to also write a daily rolling log file.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var("STUDYGATE_LOG_DIR") {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "studygate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

/// Prints the redirect instead of navigating
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn redirect(&self, to: &str) {
        eprintln!("Not signed in. Continue at {}", to);
    }
}

struct App {
    config: Config,
    session: Arc<SessionStore>,
    api: ApiClient,
    identity: Arc<SecureTokenIdentity>,
}

impl App {
    fn build(config: Config) -> Result<Self> {
        let media = config.open_media()?;
        let credentials = CredentialStore::from_medium(media.credentials.clone());
        let session = Arc::new(SessionStore::restore(credentials, media.snapshot.clone()));

        let api = ApiClient::new(&config.api_base_url, config.request_timeout())
            .context("Failed to create API client")?;
        let identity = Arc::new(SecureTokenIdentity::new(
            &config.identity_token_url,
            config.identity_api_key.clone(),
            media.credentials,
            config.request_timeout(),
        )?);

        Ok(Self {
            config,
            session,
            api,
            identity,
        })
    }

    fn guard(&self) -> RouteGuard {
        let validator = SessionValidator::new(
            self.session.clone(),
            self.identity.clone(),
            Arc::new(self.api.clone()),
        );
        RouteGuard::new(
            self.session.clone(),
            validator,
            Arc::new(TerminalNavigator),
            self.config.guard_config(),
        )
    }
}

fn report(decision: &GuardDecision, session: &SessionStore) {
    match decision {
        GuardDecision::Render => {
            if let Some(user) = session.user() {
                println!(
                    "Signed in as {} ({} credits, {}-day streak)",
                    user.label(),
                    user.credits,
                    user.streak
                );
            }
        }
        GuardDecision::Waiting => {
            println!("Sign-in service is rate limiting or unavailable. Your session was kept; run `studygate retry` shortly.");
        }
        GuardDecision::Loading => println!("Session is still loading"),
        GuardDecision::Redirect { .. } => println!("Signed out"),
    }
}

async fn status(app: &App, retry: bool) -> Result<GuardDecision> {
    let guard = app.guard();
    let mut decision = guard.mount().await;
    if retry && decision == GuardDecision::Waiting {
        decision = guard.retry().await;
    }
    guard.unmount();
    report(&decision, &app.session);
    Ok(decision)
}

async fn check_generation(app: &App, kind: GenerationKind, quantity: u32) -> Result<()> {
    let guard = app.guard();
    guard.mount().await;
    guard.unmount();

    let user = app.session.user();
    let result = can_generate(kind, user.as_ref(), quantity);
    if result.allowed {
        println!(
            "Allowed: {} {} item(s) cost {} of {} credits",
            quantity,
            kind,
            result.required.unwrap_or(0),
            result.credits.unwrap_or(0)
        );
    } else {
        println!("Denied: {}", result.reason.unwrap_or_default());
    }
    Ok(())
}

async fn login_token(app: &App) -> Result<()> {
    if !app.session.credentials().is_available() {
        anyhow::bail!("No credential store configured (STUDYGATE_STORE=none); cannot sign in");
    }

    let refresh_token = rpassword::prompt_password("Identity refresh token: ")
        .context("Failed to read refresh token")?;
    let refresh_token = refresh_token.trim();
    if refresh_token.is_empty() {
        anyhow::bail!("No refresh token given");
    }

    app.identity.store_refresh_token(refresh_token)?;
    let identity_token = app
        .identity
        .fresh_identity_token(true)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Identity provider rejected the refresh token"))?;

    let auth = app.api.sign_in(&identity_token).await?;
    let label = auth.user.label().to_string();
    app.session
        .login(auth.user, auth.session_token)
        .context("Failed to store session credential")?;
    println!("Signed in as {}", label);
    Ok(())
}

async fn logout(app: &App) -> Result<()> {
    app.session.logout();
    app.identity.sign_out().await?;
    println!("Signed out");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    info!("studygate starting");

    let args: Vec<String> = std::env::args().collect();
    let command = Command::parse(&args)?;
    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load()?;
    let app = App::build(config)?;

    match command {
        Command::Status => {
            status(&app, false).await?;
        }
        Command::Retry => {
            status(&app, true).await?;
        }
        Command::CanGenerate { kind, quantity } => check_generation(&app, kind, quantity).await?,
        Command::LoginToken => login_token(&app).await?,
        Command::Logout => logout(&app).await?,
        Command::Help => {}
    }

    Ok(())
}
