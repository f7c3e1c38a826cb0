//! Credential CLI commands
//!
//! Manages the WebDAV credential and the remembered backup password in the
//! encrypted secret store.

use clap::Subcommand;

use crate::crypto::SecureString;
use crate::error::{NoteguardError, NoteguardResult};
use crate::secrets::{WebDavCredential, BACKUP_PASSWORD_KEY};

use super::context::AppContext;
use super::password::{prompt_new_password, prompt_password};

/// Credential subcommands
#[derive(Subcommand, Debug)]
pub enum CredentialCommands {
    /// Save the WebDAV endpoint and login
    Set {
        /// Base URL backups are stored under, e.g. https://dav.example.com/notes
        #[arg(long)]
        url: String,

        /// WebDAV user name
        #[arg(long)]
        username: String,

        /// WebDAV password; prompted for when omitted
        #[arg(long, env = "NOTEGUARD_WEBDAV_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Show the saved WebDAV endpoint (never the password)
    Show,

    /// Forget the WebDAV credential
    Clear,

    /// Remember the password used by scheduled backups
    BackupPassword {
        /// Password to remember; prompted for when omitted
        #[arg(long, env = "NOTEGUARD_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Forget the remembered password instead
        #[arg(long)]
        clear: bool,
    },
}

/// Handle a credentials command
pub fn handle_credentials_command(ctx: &AppContext, cmd: CredentialCommands) -> NoteguardResult<()> {
    let secrets = ctx.secrets()?;

    match cmd {
        CredentialCommands::Set {
            url,
            username,
            password,
        } => {
            let password = match password {
                Some(p) => SecureString::from(p),
                None => prompt_password("WebDAV password: ")?,
            };
            WebDavCredential::new(url, username, password).save(secrets.as_ref())?;
            println!("WebDAV credentials saved.");
        }

        CredentialCommands::Show => match WebDavCredential::load(secrets.as_ref())? {
            Some(credential) => {
                println!("WebDAV Credentials");
                println!("==================");
                println!("URL:      {}", credential.base_url);
                println!("Username: {}", credential.username);
                println!("Password: (saved)");
            }
            None => {
                println!("No WebDAV credentials saved.");
                println!("Save them with: noteguard credentials set --url <URL> --username <USER>");
            }
        },

        CredentialCommands::Clear => {
            WebDavCredential::clear(secrets.as_ref())?;
            println!("WebDAV credentials removed.");
        }

        CredentialCommands::BackupPassword { password, clear } => {
            if clear {
                secrets.delete(BACKUP_PASSWORD_KEY)?;
                println!("Saved backup password removed.");
                return Ok(());
            }

            let password = match password {
                Some(p) => SecureString::from(p),
                None => prompt_new_password()?,
            };
            if password.is_blank() {
                return Err(NoteguardError::MissingPassword);
            }
            secrets.put(BACKUP_PASSWORD_KEY, password.as_str())?;
            println!("Backup password saved for scheduled backups.");
        }
    }

    Ok(())
}
