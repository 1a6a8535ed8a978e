//! cli::commands::password
//!
//! Store the remote password in the secret store, or remove it.
//!
//! # Security
//!
//! The password is never echoed, printed or logged. Only success or
//! failure is reported.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context as _, Result};

use super::super::Context;
use super::{load_config, secret_store};
use crate::auth::password_key;

pub fn password(ctx: &Context, forget: bool, stdin: bool) -> Result<()> {
    let config = load_config(ctx)?;
    let (Some(username), Some(url)) = (config.username(), config.remote_url()) else {
        bail!("username and remote_url must be configured; run 'gitshelf setup'");
    };
    let key = password_key(username, url);
    let store = secret_store()?;

    if forget {
        store.delete(&key).context("Failed to remove stored password")?;
        if !ctx.quiet {
            println!("Removed stored password for {}.", username);
        }
        return Ok(());
    }

    let value = if stdin {
        read_stdin()?
    } else {
        prompt(username)?
    };
    if value.is_empty() {
        bail!("Password cannot be empty.");
    }

    store.set(&key, &value).context("Failed to store password")?;
    if !ctx.quiet {
        println!("Password stored for {}.", username);
    }
    Ok(())
}

fn prompt(username: &str) -> Result<String> {
    print!("Password for {}: ", username);
    io::stdout().flush()?;
    rpassword::read_password().context("Failed to read password")
}

fn read_stdin() -> Result<String> {
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
