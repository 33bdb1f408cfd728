use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use f13_client::{
    ApiClient, ApiRequest, CaptchaFlow, CaptchaOutcome, CaptchaSolution, FilePersistence,
    SessionStore, UserSummary,
};
use serde_json::Value;
use tracing::debug;

use crate::config::AppConfig;

/// Runs subcommands against one client and its persisted session.
pub struct CommandExecutor {
    client: ApiClient,
}

impl CommandExecutor {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client_config = config.client_config();
        let persistence = Arc::new(FilePersistence::new(config.session_dir()));
        let session = Arc::new(SessionStore::open(
            client_config.storage_key.clone(),
            persistence,
        ));
        debug!(dir = %config.session_dir().display(), "Opened session store");

        let client = ApiClient::new(client_config, session)
            .context("failed to create API client")?
            .with_navigator(Arc::new(|route: &str| {
                eprintln!("Session expired ({route}). Run `f13 login` to sign in again.");
            }));

        Ok(Self { client })
    }

    pub async fn login(&self, username: &str, password: Option<String>, captcha: bool) -> Result<()> {
        let password = password_or_prompt(password)?;
        let solution = if captcha { Some(self.solve_captcha().await?) } else { None };

        let user = self
            .client
            .login(username, &password, solution.as_ref())
            .await?;
        print_user("Logged in as", &user);
        Ok(())
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: Option<String>,
        captcha: bool,
    ) -> Result<()> {
        let password = password_or_prompt(password)?;
        let solution = if captcha { Some(self.solve_captcha().await?) } else { None };

        let user = self
            .client
            .register(username, email, &password, solution.as_ref())
            .await?;
        print_user("Registered", &user);
        Ok(())
    }

    pub async fn whoami(&self) -> Result<()> {
        if !self.client.session().is_authenticated() {
            bail!("not logged in");
        }
        let user = self.client.me().await?;
        println!("{}", serde_json::to_string_pretty(&user)?);
        Ok(())
    }

    pub fn logout(&self) {
        self.client.logout();
        println!("Logged out");
    }

    pub async fn captcha(&self) -> Result<()> {
        let solution = self.solve_captcha().await?;
        println!("{}", serde_json::to_string_pretty(&solution)?);
        Ok(())
    }

    pub async fn get(&self, path: &str, query: Vec<(String, String)>) -> Result<()> {
        let request = query
            .into_iter()
            .fold(ApiRequest::get(path), |req, (k, v)| req.query(k, v));
        let body: Value = self.client.execute_json(request).await?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        Ok(())
    }

    async fn solve_captcha(&self) -> Result<CaptchaSolution> {
        let mut flow = CaptchaFlow::new(&self.client);
        let mut question = flow.start().await?.question.clone();

        loop {
            let answer = prompt(&format!("Captcha: {question} "))?;
            if answer.trim().is_empty() {
                continue;
            }
            match flow.submit(&answer).await? {
                CaptchaOutcome::Solved(solution) => return Ok(solution),
                CaptchaOutcome::Retry { message, next } => {
                    eprintln!("{message}");
                    question = next.question;
                }
            }
        }
    }
}

fn print_user(action: &str, user: &UserSummary) {
    match &user.email {
        Some(email) => println!("✓ {action} {} <{email}>", user.username),
        None => println!("✓ {action} {}", user.username),
    }
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    match password {
        Some(password) => Ok(password),
        None => prompt("Password: "),
    }
}

fn prompt(label: &str) -> Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{label}")?;
    stderr.flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        bail!("stdin closed");
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
