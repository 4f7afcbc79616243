use super::args::Command;
use crate::{
    Result,
    agent::{InferenceRequest, InferenceRunner, SchemaAgent},
    backend::BackendClient,
    config::Config,
    input::{ImageInput, InputFile, read_input_text},
    store::{ArtifactStatus, PairingListing, PairingStore},
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared handles for one CLI invocation.
pub struct Context {
    pub config: Config,
    pub store: Arc<PairingStore>,
    pub backend: Arc<dyn BackendClient>,
}

impl Context {
    pub fn new(config: Config, store: Arc<PairingStore>, backend: Arc<dyn BackendClient>) -> Self {
        Self {
            config,
            store,
            backend,
        }
    }
}

pub async fn execute(ctx: &Context, command: Command, out: &mut dyn Write) -> Result<()> {
    debug!("Executing {:?}", command);
    match command {
        Command::Create { brief, name, force } => create(ctx, &brief, &name, force, out).await,
        Command::Run {
            schema,
            prompt,
            input,
            files,
            images,
            output,
        } => {
            let attachments = Attachments { files, images };
            run(ctx, schema, prompt, input, attachments, output, out).await
        }
        Command::List => list(ctx, out).await,
        Command::Show { name } => show(ctx, &name, out).await,
        Command::Models { set } => models(ctx, set, out).await,
    }
}

async fn create(
    ctx: &Context,
    brief: &str,
    name: &str,
    force: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let agent = SchemaAgent::new(
        ctx.store.clone(),
        ctx.backend.clone(),
        ctx.config.creator.clone(),
    );
    let pairing = agent.create(brief, name, force).await?;
    let path = ctx.store.path(&pairing.name)?;

    writeln!(out, "Created pairing '{}' at {}", pairing.name, path.display())?;
    writeln!(out, "Description: {}", pairing.meta.info.description)?;
    writeln!(out)?;
    writeln!(out, "System prompt:")?;
    writeln!(out, "{}", pairing.prompt)?;
    writeln!(out)?;
    writeln!(out, "Schema:")?;
    writeln!(out, "{}", serde_json::to_string_pretty(&pairing.schema)?)?;
    Ok(())
}

/// Files and images named on the command line, not yet read.
struct Attachments {
    files: Vec<PathBuf>,
    images: Vec<String>,
}

async fn run(
    ctx: &Context,
    pairing: String,
    prompt: Option<String>,
    input: Option<String>,
    Attachments { files, images }: Attachments,
    output: Option<PathBuf>,
    out: &mut dyn Write,
) -> Result<()> {
    let text = match input {
        Some(ref value) => read_input_text(value).await?,
        None => String::new(),
    };

    let mut attachments = Vec::with_capacity(files.len());
    for path in &files {
        attachments.push(InputFile::from_path(path).await?);
    }
    let mut loaded = Vec::with_capacity(images.len());
    for reference in &images {
        loaded.push(ImageInput::load(reference).await?);
    }

    let runner = InferenceRunner::new(
        ctx.store.clone(),
        ctx.backend.clone(),
        &ctx.config.backend,
    );
    let mut request = InferenceRequest::new(pairing, text)
        .with_files(attachments)
        .with_images(loaded);
    if let Some(prompt) = prompt {
        request = request.with_prompt(prompt);
    }
    let result = runner.run(request).await?;

    let rendered = serde_json::to_string_pretty(&result.value)?;
    if let Some(path) = output {
        tokio::fs::write(&path, format!("{}\n", rendered)).await?;
        info!("Result written to {}", path.display());
    }
    writeln!(out, "{}", rendered)?;
    Ok(())
}

async fn list(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let listings = ctx.store.list().await?;
    if listings.is_empty() {
        writeln!(
            out,
            "No pairings in {}. Create one with `jig create`.",
            ctx.store.base_dir().display()
        )?;
        return Ok(());
    }

    writeln!(
        out,
        "{:<24} {:<8} {:<8} {:<8} DESCRIPTION",
        "NAME", "SCHEMA", "PROMPT", "META"
    )?;
    for listing in &listings {
        writeln!(out, "{}", format_listing(listing))?;
    }
    Ok(())
}

fn format_listing(listing: &PairingListing) -> String {
    let status = |s: ArtifactStatus| match s {
        ArtifactStatus::Valid => "ok",
        ArtifactStatus::Missing => "missing",
        ArtifactStatus::Invalid => "invalid",
    };
    format!(
        "{:<24} {:<8} {:<8} {:<8} {}",
        listing.name,
        status(listing.schema),
        status(listing.prompt),
        status(listing.meta),
        listing.description
    )
}

async fn show(ctx: &Context, name: &str, out: &mut dyn Write) -> Result<()> {
    let pairing = ctx.store.load(name).await?;
    let meta = &pairing.meta;

    writeln!(out, "Name:        {}", pairing.name)?;
    writeln!(out, "Description: {}", meta.info.description)?;
    if let Some(ref brief) = meta.info.brief {
        writeln!(out, "Brief:       {}", brief)?;
    }
    if let (Some(backend), Some(model)) = (&meta.info.backend, &meta.info.model) {
        writeln!(out, "Generated:   {} / {}", backend, model)?;
    }
    writeln!(out, "Created:     {}", meta.created.to_rfc3339())?;
    writeln!(out, "Modified:    {}", meta.modified.to_rfc3339())?;

    let backups = ctx.store.backups(&pairing.name).await?;
    if !backups.is_empty() {
        writeln!(out, "Backups:     {}", backups.len())?;
    }

    writeln!(out)?;
    writeln!(out, "System prompt:")?;
    writeln!(out, "{}", pairing.prompt)?;
    writeln!(out)?;
    writeln!(out, "Schema:")?;
    writeln!(out, "{}", serde_json::to_string_pretty(&pairing.schema)?)?;
    Ok(())
}

async fn models(ctx: &Context, set: Option<String>, out: &mut dyn Write) -> Result<()> {
    if let Some(requested) = set {
        let selected = ctx.backend.select_model(&requested).await?;
        writeln!(out, "Selected model: {}", selected)?;
        return Ok(());
    }

    let available = ctx.backend.list_models().await?;
    if available.is_empty() {
        writeln!(out, "No models available on {}", ctx.backend.endpoint())?;
        return Ok(());
    }

    let current = ctx.backend.model();
    for model in &available {
        let marker = if current.as_deref() == Some(model.as_str()) {
            "*"
        } else {
            " "
        };
        writeln!(out, "{} {}", marker, model)?;
    }
    Ok(())
}
