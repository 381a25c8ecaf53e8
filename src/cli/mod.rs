//! Command line front end

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod auth;
pub mod commands;

pub use auth::AuthManager;

#[derive(Parser, Debug)]
#[command(name = "tunemirror", about = "Live-synchronized music library client")]
#[command(version, author)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in and store the server credentials
    Auth {
        /// Server URL
        #[arg(long, env = "TUNEMIRROR_URL")]
        url: Option<String>,

        /// Login name
        #[arg(short, long, env = "TUNEMIRROR_LOGIN")]
        login: Option<String>,

        /// Password
        #[arg(short, long, env = "TUNEMIRROR_PASSWORD")]
        password: Option<String>,

        /// Force re-authentication (ignore stored credentials)
        #[arg(long)]
        force: bool,
    },

    /// Log out and forget the stored credentials
    Logout,

    /// Follow the live library and print every change
    Watch {
        /// Close the other session if one already holds the channel
        #[arg(long)]
        takeover: bool,
    },

    /// List playlists of the library
    Playlists {
        /// Also list the tracks of each playlist
        #[arg(short, long)]
        tracks: bool,
    },

    /// Upload audio files to the library
    Upload {
        /// Files to upload
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// Change your own account
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },

    /// Manage users and server settings (admins only)
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum AccountAction {
    /// Set the name shown to other users
    Nickname { name: String },

    /// Change the login password (prompts for old and new)
    Password,

    /// Upload a new avatar image
    Avatar {
        #[arg(value_name = "IMAGE")]
        file: PathBuf,
    },

    /// Remove the avatar image
    RemoveAvatar,

    /// Save preferences; flags not given are turned off
    Prefs {
        /// Interface language code
        #[arg(long, default_value = "en")]
        lang: String,

        /// Remember the login IP
        #[arg(long)]
        remember_ip: bool,

        /// Resume playback after reconnecting
        #[arg(long)]
        autoplay: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum AdminAction {
    /// List users and server settings
    Users,

    /// Create a user (prompts for the password)
    AddUser {
        login: String,

        /// Grant admin rights
        #[arg(long)]
        admin: bool,
    },

    RemoveUser { id: i64 },

    /// Grant or revoke admin rights
    SetAdmin {
        id: i64,

        #[arg(action = clap::ArgAction::Set)]
        state: bool,
    },

    /// Generate a new password for a user
    ResetPassword { id: i64 },

    /// Change server settings; options not given keep their value
    Server {
        #[arg(long)]
        language: Option<String>,

        /// Session lifetime in seconds
        #[arg(long)]
        session_time: Option<i64>,

        /// Application title shown to clients
        #[arg(long)]
        title: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_admin_takes_explicit_state() {
        let cli = Cli::try_parse_from(["tunemirror", "admin", "set-admin", "3", "false"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Admin {
                action: AdminAction::SetAdmin { id: 3, state: false }
            })
        ));
    }

    #[test]
    fn test_server_settings_are_optional() {
        let cli = Cli::try_parse_from(["tunemirror", "admin", "server", "--title", "Tunes"]).unwrap();
        match cli.command {
            Some(Commands::Admin {
                action: AdminAction::Server {
                    language,
                    session_time,
                    title,
                },
            }) => {
                assert_eq!(language, None);
                assert_eq!(session_time, None);
                assert_eq!(title.as_deref(), Some("Tunes"));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }
}
