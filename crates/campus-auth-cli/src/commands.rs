use std::io::{self, Write};

use anyhow::{Context, Result};
use campus_auth_core::{
    AuthStack, Config, RegistrationRequest, RequestError, RestoreOutcome, Role, Session,
    SignInOutcome,
};
use serde_json::Value;
use tracing::{debug, warn};

/// Observes the session the way the portal's shell does: it restores on
/// start, prints the readable error on failure, and sends the user back to
/// `campus login` whenever the session is cleared underneath them.
pub struct Shell {
    config: Config,
    stack: AuthStack,
}

impl Shell {
    pub fn new() -> Result<Self> {
        let config = Config::load().context("Failed to load config")?;
        debug!(base_url = config.base_url(), backend = ?config.credential_backend, "Config loaded");
        let stack = AuthStack::from_config(&config)?;
        Ok(Self { config, stack })
    }

    async fn restore(&self) -> RestoreOutcome {
        let outcome = self.stack.gateway.restore_session().await;
        debug!(?outcome, "Session restore finished");
        outcome
    }

    pub async fn status(&self) -> Result<()> {
        self.restore().await;
        print_session(&self.stack.session.get());
        Ok(())
    }

    pub async fn login(&mut self, email: Option<&str>) -> Result<()> {
        let email = match email.map(str::to_string).or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => prompt("Email: ")?,
        };
        let password = rpassword::prompt_password("Password: ")?;

        match self.stack.gateway.sign_in(&email, &password).await {
            Ok(outcome) => {
                self.config.last_email = Some(email);
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                if let SignInOutcome::DegradedAuthenticated(_) = outcome {
                    println!("Signed in (profile details unavailable right now).");
                }
                print_session(&self.stack.session.get());
                Ok(())
            }
            Err(e) => {
                eprintln!("{}", e.user_message());
                Err(e.into())
            }
        }
    }

    pub fn logout(&self) -> Result<()> {
        self.stack.gateway.sign_out();
        println!("Signed out.");
        Ok(())
    }

    pub async fn whoami(&self) -> Result<()> {
        if !self.restore().await.is_authenticated() {
            return self.sign_in_required();
        }
        match self.stack.gateway.refresh_profile().await {
            Ok(profile) => {
                println!("{}", serde_json::to_string_pretty(&profile)?);
                Ok(())
            }
            Err(e) => self.request_failed(e),
        }
    }

    pub async fn get(&self, path: &str) -> Result<()> {
        self.restore().await;
        match self.stack.requests.get::<Value>(path).await {
            Ok(body) => {
                println!("{}", serde_json::to_string_pretty(&body)?);
                Ok(())
            }
            Err(e) => self.request_failed(e),
        }
    }

    pub async fn register(&self, args: &[String]) -> Result<()> {
        let [name, email, role, extra @ ..] = args else {
            return Err(anyhow::anyhow!("register needs <name> <email> <role>"));
        };
        let role: Role = serde_json::from_value(Value::String(role.to_lowercase()))
            .context("Role must be student, faculty, staff or admin")?;
        if role == Role::Unknown {
            return Err(anyhow::anyhow!("Role must be student, faculty, staff or admin"));
        }

        let password = rpassword::prompt_password("Password: ")?;
        let mut registration = RegistrationRequest::new(name, email, &password, role);
        if let Some(department) = extra.first() {
            registration = registration.department(department);
        }
        if let Some(number) = extra.get(1) {
            registration = registration.student_number(number);
        }

        match self.stack.gateway.register(&registration).await {
            Ok(response) => {
                let message = response
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Registration complete. Check your email to verify the account.");
                println!("{}", message);
                Ok(())
            }
            Err(e) => {
                eprintln!("{}", e.user_message());
                Err(e.into())
            }
        }
    }

    pub async fn verify_email(&self, token: &str) -> Result<()> {
        self.stack
            .gateway
            .verify_email(token)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        println!("Email verified. You can sign in now.");
        Ok(())
    }

    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        self.stack
            .gateway
            .forgot_password(email)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        println!("If the address is registered, a reset link is on its way.");
        Ok(())
    }

    pub async fn reset_password(&self, token: &str) -> Result<()> {
        let password = rpassword::prompt_password("New password: ")?;
        let confirm = rpassword::prompt_password("Repeat: ")?;
        if password != confirm {
            return Err(anyhow::anyhow!("Passwords do not match"));
        }
        self.stack
            .gateway
            .reset_password(token, &password)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        println!("Password updated. Sign in with `campus login`.");
        Ok(())
    }

    fn request_failed(&self, err: RequestError) -> Result<()> {
        if self.stack.session.get().redirect_to_sign_in() {
            return self.sign_in_required();
        }
        eprintln!("{}", err.user_message());
        Err(err.into())
    }

    fn sign_in_required(&self) -> Result<()> {
        eprintln!("Your session has ended. Sign in again with `campus login`.");
        Err(anyhow::anyhow!("Not signed in"))
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_session(session: &Session) {
    match session.user.as_ref() {
        Some(user) if session.is_authenticated() => {
            let role = user.role.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string());
            println!("Signed in as {} ({})", user.display_name(), role);
        }
        _ => println!("Not signed in"),
    }
}
