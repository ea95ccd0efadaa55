use std::path::{Path, PathBuf};

use poise::{
    CreateReply,
    serenity_prelude::{self as serenity, CreateEmbed},
};
use tokio::{io::AsyncWriteExt, sync::RwLock};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::{
    Context, Error,
    infrastructure::{colors, util::DebuggableReply},
    soundboard::SoundRegistry,
};

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Cannot download the attachment: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Discord returned {0} for the attachment")]
    Status(reqwest::StatusCode),
    #[error("The attachment is larger than the {0} byte limit")]
    TooLarge(u64),
    #[error("Cannot save the attachment: {0}")]
    Io(#[from] std::io::Error),
}

/// Streams `url` into `dir/file_name`, replacing any existing file of that name.
///
/// The body goes to a hidden temporary file that is renamed into place once complete. A failed download leaves
/// nothing in `dir`.
pub async fn download(
    client: &reqwest::Client,
    url: &str,
    dir: &Path,
    file_name: &str,
    max_bytes: u64,
) -> Result<PathBuf, DownloadError> {
    tokio::fs::create_dir_all(dir).await?;
    let temp_path = dir.join(format!(".{}.part", Uuid::new_v4()));
    let destination = dir.join(file_name);

    let result = write_response(client, url, &temp_path, max_bytes).await;
    if let Err(e) = result {
        if let Err(remove_err) = tokio::fs::remove_file(&temp_path).await {
            trace!("Could not remove {}: {}", temp_path.display(), remove_err);
        }
        return Err(e);
    }

    tokio::fs::rename(&temp_path, &destination).await?;
    debug!("Saved attachment to {}", destination.display());
    Ok(destination)
}

async fn write_response(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
    max_bytes: u64,
) -> Result<(), DownloadError> {
    trace!("Downloading file attachment");
    let mut response = client.get(url).send().await?;
    if !response.status().is_success() {
        warn!("Discord returned non-success api response");
        return Err(DownloadError::Status(response.status()));
    }
    if response.content_length().is_some_and(|len| len > max_bytes) {
        return Err(DownloadError::TooLarge(max_bytes));
    }

    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(DownloadError::TooLarge(max_bytes));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Maps `name` to `file_name` and deletes the file of the sound it replaced, if that was a different file.
///
/// Returns the updated `play` choices.
pub async fn record_sound(
    sounds: &RwLock<SoundRegistry>,
    name: &str,
    file_name: &str,
) -> Vec<(String, String)> {
    let (replaced_path, choices) = {
        let mut sounds = sounds.write().await;
        let replaced = sounds.add(name, file_name);
        let replaced_path = replaced
            .filter(|previous| previous.relative_path() != Path::new(file_name))
            .map(|previous| sounds.path_of(&previous));
        (replaced_path, sounds.choices())
    };
    if let Some(previous_path) = replaced_path
        && let Err(e) = tokio::fs::remove_file(&previous_path).await
    {
        warn!(
            "Failed to remove replaced sound {}: {}",
            previous_path.display(),
            e
        );
    }
    choices
}

/// Adds a sound to the soundboard
#[poise::command(slash_command, guild_only)]
pub async fn register(
    ctx: Context<'_>,
    #[description = "The name of the sound"] name: String,
    #[description = "The audio file to play"] file: serenity::Attachment,
) -> Result<(), Error> {
    let name = name.trim().to_string();
    trace!(
        name = name.as_str(),
        file = file.filename.as_str(),
        "register executed with args"
    );
    SoundRegistry::validate_name(&name)?;
    let max_bytes = ctx.data().max_sound_bytes;
    if u64::from(file.size) > max_bytes {
        return Err(DownloadError::TooLarge(max_bytes).into());
    }
    ctx.defer_ephemeral().await?;

    let root = ctx.data().sounds.read().await.root().to_path_buf();
    let file_name = SoundRegistry::file_name_for(&name, &file.filename);
    download(
        &ctx.data().http_client,
        &file.url,
        &root,
        &file_name,
        max_bytes,
    )
    .await?;

    let choices = record_sound(&ctx.data().sounds, &name, &file_name).await;
    info!("Registered sound {} as {}", name, file_name);

    ctx.data()
        .catalog
        .refresh_play(ctx.http(), &choices)
        .await?;

    let reply = CreateReply::default().embed(
        CreateEmbed::new()
            .description(format!("Added {} to the soundboard", name))
            .color(colors::green()),
    );
    trace!("Sending reply: {:?}", DebuggableReply::new(&reply));
    ctx.send(reply).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    /// Serves a single HTTP response and returns the url to request it from.
    async fn serve_once(status_line: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}/clip.mp3", addr)
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_download_saves_body() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_once("200 OK", b"ID3 clip bytes".to_vec()).await;

        let path = download(&client(), &url, dir.path(), "boom.mp3", 1024)
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("boom.mp3"));
        assert_eq!(std::fs::read(&path).unwrap(), b"ID3 clip bytes");
        assert_eq!(dir_entries(dir.path()), vec!["boom.mp3"]);
    }

    #[tokio::test]
    async fn test_download_overwrites_existing_clip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("boom.mp3"), b"old").unwrap();
        let url = serve_once("200 OK", b"new".to_vec()).await;

        download(&client(), &url, dir.path(), "boom.mp3", 1024)
            .await
            .unwrap();

        assert_eq!(std::fs::read(dir.path().join("boom.mp3")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_download_rejects_error_status() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_once("404 Not Found", b"missing".to_vec()).await;

        let result = download(&client(), &url, dir.path(), "boom.mp3", 1024).await;

        assert!(matches!(
            result,
            Err(DownloadError::Status(status)) if status == reqwest::StatusCode::NOT_FOUND
        ));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_download_enforces_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_once("200 OK", vec![0u8; 64]).await;

        let result = download(&client(), &url, dir.path(), "boom.mp3", 16).await;

        assert!(matches!(result, Err(DownloadError::TooLarge(16))));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_reregistering_with_new_extension_removes_old_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("boom.mp3"), b"old").unwrap();
        std::fs::write(dir.path().join("boom.ogg"), b"new").unwrap();
        let mut registry = SoundRegistry::empty(dir.path());
        registry.add("boom", "boom.mp3");
        let sounds = RwLock::new(registry);

        let choices = record_sound(&sounds, "boom", "boom.ogg").await;

        assert_eq!(choices, vec![("boom".to_string(), "boom".to_string())]);
        assert_eq!(dir_entries(dir.path()), vec!["boom.ogg"]);
        let sounds = sounds.read().await;
        assert_eq!(
            sounds.get("boom").map(|sound| sound.relative_path()),
            Some(Path::new("boom.ogg"))
        );
    }

    #[tokio::test]
    async fn test_reregistering_same_file_keeps_it() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("boom.mp3"), b"clip").unwrap();
        let sounds = RwLock::new(SoundRegistry::load(dir.path()).unwrap());

        record_sound(&sounds, "boom", "boom.mp3").await;

        assert_eq!(dir_entries(dir.path()), vec!["boom.mp3"]);
    }
}
