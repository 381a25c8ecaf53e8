//! CLI command handlers

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::Local;
use clap::CommandFactory;
use clap_complete::generate;
use colored::Colorize;
use dialoguer::Password;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use super::{AccountAction, AdminAction, AuthManager};
use crate::api::{HttpClient, ServerVars};
use crate::config::{ClientConfig, SessionMemory};
use crate::library::{LibraryStore, Playlist};
use crate::session::{Session, SessionUpdate};
use crate::sync::{ChannelUpdate, ConnectionState, SyncChannel};
use crate::upload::{UploadFile, UploadOutcome, UploadQueueManager};
use crate::utils::format_duration;

/// Handle the `auth` command
pub async fn auth(
    url: Option<String>,
    login: Option<String>,
    password: Option<String>,
    force: bool,
) -> Result<()> {
    println!("{}", "Configuring server credentials...".cyan());

    let creds = AuthManager::authenticate(url, login, password, force).await?;

    let mut config = ClientConfig::load()?;
    if config.server_url.as_deref() != Some(creds.url.as_str()) {
        config.server_url = Some(creds.url.clone());
        config.save()?;
    }

    println!();
    println!("{}", "Authentication successful!".green().bold());
    println!("  Server: {}", creds.url);
    println!("  Login: {}", creds.login);
    println!();
    println!("Credentials stored securely in system keyring.");

    Ok(())
}

/// Handle the `logout` command
pub async fn logout() -> Result<()> {
    if let Ok(creds) = AuthManager::load() {
        let client = AuthManager::connect(&creds).await?;
        if let Err(e) = client.logout().await {
            println!("{} {}", "Server logout failed:".yellow(), e);
        }
    }
    AuthManager::clear()?;
    println!("{}", "Logged out.".green());
    Ok(())
}

/// Log in with the stored credentials
async fn login() -> Result<Arc<HttpClient>> {
    let creds = AuthManager::load()
        .map_err(|_| anyhow::anyhow!("No credentials found. Run 'tunemirror auth' first to configure."))?;
    let client = AuthManager::connect(&creds).await?;
    Ok(Arc::new(client))
}

/// Handle the `watch` command
pub async fn watch(takeover: bool) -> Result<()> {
    let config = ClientConfig::load()?;
    let memory = SessionMemory::load()?;
    let client = login().await?;

    let (handle, mut updates, task) = Session::spawn(client.clone(), client, &config, memory);
    println!("{}", "Watching library (Ctrl-C to stop)...".cyan());

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else {
                    break;
                };
                if takeover && update == SessionUpdate::Connection(ConnectionState::AlreadyConnected) {
                    println!("{}", "Closing the other session...".yellow());
                    handle.takeover();
                }
                print_update(&update);
            }
            _ = tokio::signal::ctrl_c() => {
                handle.quit();
                break;
            }
        }
    }

    task.await.context("Session task failed")?;
    Ok(())
}

fn print_update(update: &SessionUpdate) {
    let time = Local::now().format("%H:%M:%S").to_string().dimmed();
    match update {
        SessionUpdate::Connection(state) => {
            let state = match state {
                ConnectionState::Ready => "connected".green(),
                ConnectionState::Loading => "connecting".cyan(),
                ConnectionState::Error => "disconnected".red(),
                ConnectionState::AlreadyConnected => "another session is active".yellow(),
                ConnectionState::Destroyed => "session closed by server".red().bold(),
            };
            println!("{} {}", time, state);
        }
        SessionUpdate::Reconnecting(seconds) => {
            println!("{} reconnecting in {}s", time, seconds);
        }
        SessionUpdate::Hydrated(restored) => {
            println!("{} {}", time, "library loaded".green());
            if let Some(key) = &restored.now_playing {
                println!("{}   now playing {}", time, key);
            }
        }
        SessionUpdate::NowPlaying(Some(key)) => println!("{} now playing {}", time, key),
        SessionUpdate::NowPlaying(None) => println!("{} playback stopped", time),
        SessionUpdate::Notice(notice) if notice.is_error() => {
            println!("{} {}", time, notice.to_string().red())
        }
        SessionUpdate::Notice(notice) => println!("{} {}", time, notice),
        SessionUpdate::Upload(UploadOutcome::Failed { id, error }) => {
            println!("{} upload {} failed: {}", time, id, error.to_string().red());
        }
        SessionUpdate::Ftp { pending, processed } => {
            println!("{} FTP import: {} processed, {} pending", time, processed, pending);
        }
        SessionUpdate::LibraryChanged
        | SessionUpdate::Upload(_)
        | SessionUpdate::Gesture(_)
        | SessionUpdate::ContextRequest { .. } => {}
    }
}

/// Handle the `playlists` command
pub async fn playlists(show_tracks: bool) -> Result<()> {
    let config = ClientConfig::load()?;
    let client = login().await?;

    println!("{}", "Loading library...".cyan());
    let (mut channel, mut events) = SyncChannel::new(client, config.reconnect_secs);
    let mut store = LibraryStore::new();
    let memory = SessionMemory::in_memory();
    channel.open();

    while let Some(event) = events.recv().await {
        match channel.handle(event, &mut store, &memory) {
            Some(ChannelUpdate::Hydrated(_)) => break,
            Some(ChannelUpdate::Disconnected(err)) => {
                anyhow::bail!("Failed to load library: {}", err)
            }
            Some(ChannelUpdate::AlreadyConnected) => {
                anyhow::bail!("Another session is active. Run 'tunemirror watch --takeover' to close it.")
            }
            Some(ChannelUpdate::Destroyed) => anyhow::bail!("Session closed by server"),
            _ => {}
        }
    }
    channel.close();

    println!();
    println!(
        "{} ({} tracks)",
        store.app_title().green().bold(),
        store.track_count()
    );

    for playlist in store.playlists() {
        let duration: f64 = playlist
            .tracks
            .iter()
            .filter_map(|k| store.track(k))
            .map(|t| t.duration)
            .sum();
        println!(
            "  {} - {} track(s), {}",
            playlist_label(playlist).cyan(),
            playlist.tracks.len(),
            format_duration(duration)
        );

        if show_tracks {
            for track in playlist.tracks.iter().filter_map(|k| store.track(k)) {
                println!("      {} [{}]", track.display_name(), format_duration(track.duration));
            }
        }
    }

    Ok(())
}

fn playlist_label(playlist: &Playlist) -> String {
    if playlist.is_library() {
        "All tracks".to_string()
    } else {
        playlist.name.clone()
    }
}

/// Handle the `upload` command
pub async fn upload(paths: Vec<PathBuf>) -> Result<()> {
    let config = ClientConfig::load()?;

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        files.push(UploadFile::from_path(path).await?);
    }

    let client = login().await?;
    let (mut uploads, mut events) = UploadQueueManager::new(client, config.extensions.clone());

    let queued = uploads.enqueue(files);
    if queued.is_empty() {
        println!(
            "{}",
            format!("No files to upload (accepted: {}).", config.extensions.join(", ")).yellow()
        );
        return Ok(());
    }
    println!("Uploading {} file(s)...", queued.len());

    let progress = ProgressBar::new(uploads.progress().total);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );

    let mut uploaded = 0;
    let mut failed = Vec::new();
    while uploads.is_busy() {
        if let Some(task) = uploads.active() {
            progress.set_message(task.file.name.clone());
        }
        let Some(event) = events.recv().await else {
            break;
        };
        match uploads.handle_event(event) {
            Some(UploadOutcome::Progress(batch)) => progress.set_position(batch.sent),
            Some(UploadOutcome::Done(_)) => {
                uploaded += 1;
                progress.set_position(uploads.progress().sent);
            }
            Some(UploadOutcome::Failed { id, error }) => {
                let name = uploads
                    .tasks()
                    .iter()
                    .find(|t| t.id == id)
                    .map(|t| t.file.name.clone())
                    .unwrap_or_default();
                failed.push((name, error));
            }
            None => {}
        }
    }
    progress.finish_and_clear();

    println!();
    println!("{}", "Upload complete!".green().bold());
    println!("  Uploaded: {}", uploaded);
    if !failed.is_empty() {
        println!("  {} {}", "Failed:".red(), failed.len());
        for (name, error) in &failed {
            println!("    - {}: {}", name, error);
        }
    }

    Ok(())
}

/// Handle the `account` command
pub async fn account(action: AccountAction) -> Result<()> {
    let client = login().await?;

    match action {
        AccountAction::Nickname { name } => {
            client.change_nickname(&name).await.context("Failed to change nickname")?;
            println!("{} {}", "Nickname set to".green(), name);
        }
        AccountAction::Password => {
            let old = Password::new()
                .with_prompt("Current password")
                .interact()
                .context("Failed to read password")?;
            let new = Password::new()
                .with_prompt("New password")
                .with_confirmation("Repeat new password", "Passwords do not match")
                .interact()
                .context("Failed to read password")?;
            client.change_password(&old, &new).await.context("Failed to change password")?;

            if let Ok(mut creds) = AuthManager::load() {
                creds.password = new;
                AuthManager::store(&creds)?;
            }
            println!("{}", "Password changed.".green());
        }
        AccountAction::Avatar { file } => {
            let image = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            client
                .change_avatar(Bytes::from(image))
                .await
                .context("Failed to upload avatar")?;
            println!("{}", "Avatar updated.".green());
        }
        AccountAction::RemoveAvatar => {
            client.remove_avatar().await.context("Failed to remove avatar")?;
            println!("{}", "Avatar removed.".green());
        }
        AccountAction::Prefs {
            lang,
            remember_ip,
            autoplay,
        } => {
            client
                .update_user(&lang, remember_ip, autoplay)
                .await
                .context("Failed to save preferences")?;
            println!("{}", "Preferences saved.".green());
        }
    }

    Ok(())
}

/// Handle the `admin` command
pub async fn admin(action: AdminAction) -> Result<()> {
    let client = login().await?;

    match action {
        AdminAction::Users => {
            let data = client.server_data().await.context("Failed to read server data")?;
            println!("{}", "Users".green().bold());
            for user in &data.users {
                let role = if user.is_admin { "admin".yellow() } else { "user".normal() };
                println!("  {:>4}  {}  [{}]", user.id, user.nickname, role);
            }
            println!();
            println!("{}", "Server".green().bold());
            print_server_vars(&data.vars);
        }
        AdminAction::AddUser { login, admin } => {
            let password = Password::new()
                .with_prompt(format!("Password for {}", login))
                .with_confirmation("Repeat password", "Passwords do not match")
                .interact()
                .context("Failed to read password")?;
            let user = client
                .add_user(&login, &password, admin)
                .await
                .context("Failed to add user")?;
            println!("{} {} (id {})", "Added user".green(), user.nickname, user.id);
        }
        AdminAction::RemoveUser { id } => {
            client.remove_user(id).await.context("Failed to remove user")?;
            println!("{} {}", "Removed user".green(), id);
        }
        AdminAction::SetAdmin { id, state } => {
            client.set_admin(id, state).await.context("Failed to change admin rights")?;
            let verb = if state { "granted to" } else { "revoked from" };
            println!("Admin rights {} user {}", verb, id);
        }
        AdminAction::ResetPassword { id } => {
            let password = client.reset_password(id).await.context("Failed to reset password")?;
            println!("New password for user {}: {}", id, password.bold());
        }
        AdminAction::Server {
            language,
            session_time,
            title,
        } => {
            let mut vars = client.server_data().await.context("Failed to read server data")?.vars;
            merge_server_vars(&mut vars, language, session_time, title);
            client.set_server_data(&vars).await.context("Failed to save server settings")?;
            println!("{}", "Server settings saved.".green());
            print_server_vars(&vars);
        }
    }

    Ok(())
}

fn merge_server_vars(vars: &mut ServerVars, language: Option<String>, session_time: Option<i64>, title: Option<String>) {
    if let Some(language) = language {
        vars.default_language = language;
    }
    if let Some(session_time) = session_time {
        vars.session_time = session_time;
    }
    if let Some(title) = title {
        vars.custom_app_title = title;
    }
}

fn print_server_vars(vars: &ServerVars) {
    println!("  Default language: {}", vars.default_language);
    println!("  Session time: {}s", vars.session_time);
    if !vars.custom_app_title.is_empty() {
        println!("  App title: {}", vars.custom_app_title);
    }
}

/// Handle the `completion` command
pub fn completion(shell: clap_complete::Shell) {
    let mut cmd = <super::Cli as CommandFactory>::command();
    generate(shell, &mut cmd, "tunemirror", &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_unset_server_vars() {
        let mut vars = ServerVars {
            default_language: "en".to_string(),
            session_time: 3600,
            custom_app_title: "Music".to_string(),
        };
        merge_server_vars(&mut vars, None, Some(60), None);
        assert_eq!(vars.default_language, "en");
        assert_eq!(vars.session_time, 60);
        assert_eq!(vars.custom_app_title, "Music");
    }
}
