use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use url::Url;

use client_core::{
    ClientError, FileTokenStore, ReactionController, ReactionOutcome, ReactionSnapshot,
    VistagramClient,
};
use media_integration::{
    fallback_caption, CaptionProvider, CdnUploader, GenerativeCaptioner, ImageFile, ImageUploader,
    MissingCaptionProvider, MissingImageUploader,
};
use shared::{
    domain::{FeedFilter, PostId},
    protocol::{
        CreatePostRequest, FeedQuery, LoginRequest, PostPayload, SignupRequest, UpdatePostRequest,
    },
};

mod config;

#[derive(Parser, Debug)]
#[command(name = "vistagram", about = "Vistagram command-line client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and start a session.
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Log in and store the session token.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// End the session. Clears the local token even if the backend is down.
    Logout,
    /// List posts.
    Feed {
        #[arg(long, default_value = "recent")]
        filter: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show one post.
    Show { post_id: i64 },
    /// Create a post, optionally uploading an image and generating a caption.
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        caption: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
        /// Ask the caption service to write the caption from the image.
        #[arg(long)]
        generate_caption: bool,
    },
    /// Edit a post's title and/or caption.
    Update {
        post_id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        caption: Option<String>,
    },
    /// Delete a post.
    Delete { post_id: i64 },
    /// Toggle your like on a post.
    Like { post_id: i64 },
    /// Toggle your dislike on a post.
    Dislike { post_id: i64 },
    /// Share a post.
    Share { post_id: i64 },
    /// Check that the backend is reachable.
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    let settings = config::load_settings();

    let tokens = Arc::new(FileTokenStore::new(&settings.token_path));
    let base_url = Url::parse(&settings.api_base_url)
        .with_context(|| format!("invalid api base url '{}'", settings.api_base_url))?;
    let client = VistagramClient::new(base_url, tokens);

    match cli.command {
        Command::Signup {
            username,
            email,
            password,
        } => {
            let auth = client
                .signup(SignupRequest {
                    username,
                    email,
                    password,
                })
                .await?;
            println!(
                "signed up as {} (user_id={})",
                auth.user.username, auth.user.user_id.0
            );
        }
        Command::Login { email, password } => {
            let auth = client.login(LoginRequest { email, password }).await?;
            println!(
                "logged in as {} (user_id={})",
                auth.user.username, auth.user.user_id.0
            );
        }
        Command::Logout => {
            client.logout().await;
            println!("logged out");
        }
        Command::Feed {
            filter,
            page,
            limit,
        } => {
            let filter = FeedFilter::parse(&filter)
                .with_context(|| format!("unknown feed filter '{filter}'"))?;
            let posts = client
                .fetch_posts(FeedQuery {
                    filter,
                    page,
                    limit,
                })
                .await?;
            if posts.is_empty() {
                println!("no posts yet");
            }
            for post in posts {
                print_post_line(&post);
            }
        }
        Command::Show { post_id } => {
            let post = client.fetch_post(PostId(post_id)).await?;
            print_post_full(&post);
        }
        Command::Create {
            title,
            caption,
            image,
            generate_caption,
        } => {
            let uploader = build_uploader(&settings);
            let captioner = build_captioner(&settings);

            let mut image_url = None;
            let mut image_file = None;
            if let Some(path) = image {
                let file = read_image(&path)?;
                let uploaded = uploader.upload_image(&file).await?;
                println!("uploaded image: {}", uploaded.url);
                image_url = Some(uploaded.url);
                image_file = Some(file);
            }

            let content = match caption {
                Some(caption) => caption,
                None if generate_caption => {
                    let file = image_file
                        .as_ref()
                        .context("--generate-caption requires --image")?;
                    match captioner.caption_image(&file.mime_type, &file.bytes).await {
                        Ok(caption) => caption,
                        Err(err) => {
                            warn!("caption generation failed: {err}");
                            fallback_caption(&err).to_string()
                        }
                    }
                }
                None => bail!("a caption is required: pass --caption or --generate-caption"),
            };

            let post = client
                .create_post(CreatePostRequest {
                    title,
                    content,
                    image_url,
                })
                .await?;
            println!("created post {}", post.post_id.0);
            print_post_full(&post);
        }
        Command::Update {
            post_id,
            title,
            caption,
        } => {
            if title.is_none() && caption.is_none() {
                bail!("nothing to update: pass --title and/or --caption");
            }
            let post = client
                .update_post(
                    PostId(post_id),
                    UpdatePostRequest {
                        title,
                        content: caption,
                    },
                )
                .await?;
            println!("updated post {}", post.post_id.0);
            print_post_full(&post);
        }
        Command::Delete { post_id } => {
            client.delete_post(PostId(post_id)).await?;
            println!("deleted post {post_id}");
        }
        Command::Like { post_id } => {
            let controller = seed_controller(&client, post_id).await?;
            report_toggle("like", controller.like().await, &controller).await?;
        }
        Command::Dislike { post_id } => {
            let controller = seed_controller(&client, post_id).await?;
            report_toggle("dislike", controller.dislike().await, &controller).await?;
        }
        Command::Share { post_id } => {
            let controller = seed_controller(&client, post_id).await?;
            match controller.share().await {
                Ok(count) => println!("shared post {post_id} (shares={count})"),
                Err(err) => {
                    // Shares are optimistic with no rollback: the local
                    // count already moved.
                    let snapshot = controller.snapshot().await;
                    eprintln!(
                        "share failed: {err} (local count stays at {})",
                        snapshot.share_count
                    );
                    return Err(err.into());
                }
            }
        }
        Command::Health => {
            client.health().await?;
            println!("backend is reachable at {}", client.base_url());
        }
    }

    Ok(())
}

async fn seed_controller(
    client: &Arc<VistagramClient>,
    post_id: i64,
) -> Result<ReactionController> {
    let post = client.fetch_post(PostId(post_id)).await?;
    Ok(client.reaction_controller(&post))
}

async fn report_toggle(
    verb: &str,
    outcome: Result<ReactionOutcome, ClientError>,
    controller: &ReactionController,
) -> Result<()> {
    match outcome {
        Ok(ReactionOutcome::Applied(snapshot)) => {
            print_snapshot(verb, snapshot);
            Ok(())
        }
        Ok(ReactionOutcome::Dropped) => {
            println!("a reaction is already in flight for this post; nothing sent");
            Ok(())
        }
        Err(err) => {
            let restored = controller.snapshot().await;
            eprintln!(
                "{verb} failed: {err} (rolled back to likes={} dislikes={})",
                restored.like_count, restored.dislike_count
            );
            Err(err.into())
        }
    }
}

fn print_snapshot(verb: &str, snapshot: ReactionSnapshot) {
    println!(
        "{verb} settled: likes={} dislikes={} shares={} yours={:?}",
        snapshot.like_count,
        snapshot.dislike_count,
        snapshot.share_count,
        snapshot.viewer_reaction
    );
}

fn print_post_line(post: &PostPayload) {
    println!(
        "#{} {} — by {} on {} (likes={} dislikes={} shares={})",
        post.post_id.0,
        post.title,
        post.username.as_deref().unwrap_or("anonymous"),
        post.created_at.format("%Y-%m-%d %H:%M"),
        post.like_count,
        post.dislike_count,
        post.share_count
    );
}

fn print_post_full(post: &PostPayload) {
    print_post_line(post);
    println!("{}", post.content);
    if let Some(image_url) = &post.image_url {
        println!("image: {image_url}");
    }
}

fn build_uploader(settings: &config::Settings) -> Arc<dyn ImageUploader> {
    match (&settings.cdn_cloud_name, &settings.cdn_upload_preset) {
        (Some(cloud_name), Some(upload_preset)) => Arc::new(CdnUploader::new(
            settings.cdn_base_url.clone(),
            cloud_name.clone(),
            upload_preset.clone(),
        )),
        _ => Arc::new(MissingImageUploader),
    }
}

fn build_captioner(settings: &config::Settings) -> Arc<dyn CaptionProvider> {
    match &settings.caption_api_key {
        Some(api_key) => Arc::new(GenerativeCaptioner::new(
            settings.caption_base_url.clone(),
            api_key.clone(),
            settings.caption_model.clone(),
        )),
        None => Arc::new(MissingCaptionProvider),
    }
}

fn read_image(path: &Path) -> Result<ImageFile> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read image {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();
    Ok(ImageFile {
        mime_type: mime_for_path(path).to_string(),
        filename,
        bytes,
    })
}

fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
