use crate::csv_parser::CsvParser;
use crate::snapshot_repository::SnapshotRepository;
use anyhow::{Context, Result};
use chrono::SecondsFormat;
use clap::{Parser, Subcommand};
use docvault_core::{
    Document, DocumentService, DocumentType, FsObjectStore, ParserRegistry, PlainTextParser,
    TenantId, VaultConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "docvault")]
#[command(about = "Tenant-isolated encrypted document store", long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value = "docvault.toml")]
    pub config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Encrypt and store a file, then chunk it
    Upload {
        file: PathBuf,
        #[arg(short, long, env = "DOCVAULT_TENANT")]
        tenant: String,
        #[arg(short, long, default_value = "default")]
        workspace: String,
        /// pdf, csv or excel; inferred from the extension when omitted
        #[arg(long = "type")]
        doc_type: Option<DocumentType>,
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Delete and regenerate every chunk of a document
    Reprocess { document_id: Uuid },
    /// Print one decrypted chunk
    Chunk {
        chunk_id: Uuid,
        #[arg(short, long, env = "DOCVAULT_TENANT")]
        tenant: String,
    },
    /// Print every decrypted chunk of a document
    Chunks {
        document_id: Uuid,
        #[arg(short, long, env = "DOCVAULT_TENANT")]
        tenant: String,
    },
    /// Decrypt the original file
    Download {
        document_id: Uuid,
        #[arg(short, long, env = "DOCVAULT_TENANT")]
        tenant: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Delete a document, its chunks and its blob
    Delete { document_id: Uuid },
    /// List the documents of a workspace
    List {
        #[arg(short, long, default_value = "default")]
        workspace: String,
    },
    /// Print the effective configuration (secret omitted)
    Config,
}

/// Read the config file if present, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<VaultConfig> {
    let config = if path.exists() {
        VaultConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?
    } else {
        VaultConfig::default()
    };
    Ok(config.with_env_overrides())
}

/// Wire the filesystem store, snapshot catalog and bundled parsers.
pub async fn build_service(config: &VaultConfig) -> Result<DocumentService> {
    let store = Arc::new(FsObjectStore::new(config.storage.blob_dir()));
    let repository = Arc::new(SnapshotRepository::open(config.storage.catalog_path()).await?);
    let parsers = ParserRegistry::new()
        .with_parser(DocumentType::Pdf, Arc::new(PlainTextParser))
        .with_parser(DocumentType::Csv, Arc::new(CsvParser::default()));
    Ok(DocumentService::new(config, store, repository, parsers)?)
}

impl Cli {
    pub async fn run(self, config: VaultConfig) -> Result<()> {
        if let Command::Config = self.command {
            println!("{}", toml::to_string_pretty(&config)?);
            return Ok(());
        }
        let service = build_service(&config).await?;

        match self.command {
            Command::Upload {
                file,
                tenant,
                workspace,
                doc_type,
                name,
            } => upload(&service, &file, &tenant, &workspace, doc_type, name).await,
            Command::Reprocess { document_id } => {
                let report = service.reprocess_document(document_id).await?;
                println!("Document: {}", report.document_id);
                println!("Strategy: {}", report.strategy);
                println!("Chunks:   {}", report.chunks_processed);
                println!("Batches:  {}", report.batches_written);
                Ok(())
            }
            Command::Chunk { chunk_id, tenant } => {
                let plaintext = service
                    .retrieve_document_chunk(chunk_id, &TenantId::new(tenant))
                    .await?;
                println!("{}", String::from_utf8_lossy(&plaintext));
                Ok(())
            }
            Command::Chunks {
                document_id,
                tenant,
            } => {
                let chunks = service
                    .list_chunks(document_id, &TenantId::new(tenant))
                    .await?;
                println!("{}", serde_json::to_string_pretty(&chunks)?);
                Ok(())
            }
            Command::Download {
                document_id,
                tenant,
                output,
            } => {
                let bytes = service
                    .download_document(document_id, &TenantId::new(tenant))
                    .await?;
                tokio::fs::write(&output, &bytes)
                    .await
                    .with_context(|| format!("writing {}", output.display()))?;
                println!("Wrote {} to {}", format_bytes(bytes.len() as u64), output.display());
                Ok(())
            }
            Command::Delete { document_id } => {
                let report = service.delete_document(document_id).await?;
                println!("Deleted document {}", document_id);
                println!("Chunks removed: {}", report.chunks_deleted);
                if !report.blob_deleted {
                    println!("Blob could not be removed; see logs");
                }
                Ok(())
            }
            Command::List { workspace } => {
                let docs = service.list_documents(&workspace).await?;
                print_documents(&service, &docs).await
            }
            Command::Config => Ok(()),
        }
    }
}

async fn upload(
    service: &DocumentService,
    file: &Path,
    tenant: &str,
    workspace: &str,
    doc_type: Option<DocumentType>,
    name: Option<String>,
) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("file path has no file name")?,
    };
    let doc_type = match doc_type {
        Some(t) => t,
        None => DocumentType::from_file_name(&name)?,
    };
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let document = service
        .upload_document(&bytes, &TenantId::new(tenant), workspace, doc_type, &name)
        .await?;
    // The process exits after this command; let a detached run finish first.
    let document = service.wait_for_processing(document.id).await?;

    println!("Document: {}", document.id);
    println!("Locator:  {}", document.blob_locator);
    println!("Size:     {}", format_bytes(document.file_size));
    match (&document.processed_at, &document.last_error) {
        (Some(at), _) => println!("Processed: {}", at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        (None, Some(err)) => println!("Unprocessed: {}", err),
        (None, None) => println!("Unprocessed"),
    }
    Ok(())
}

async fn print_documents(service: &DocumentService, docs: &[Document]) -> Result<()> {
    println!(
        "{:<36} {:<24} {:<6} {:>10} {:<12} {:<20}",
        "ID", "NAME", "TYPE", "SIZE", "STATE", "CREATED"
    );
    println!("{}", "-".repeat(113));
    for doc in docs {
        let state = service.document_state(doc.id).await?;
        println!(
            "{:<36} {:<24} {:<6} {:>10} {:<12} {:<20}",
            doc.id,
            truncate(&doc.name, 24),
            doc.doc_type,
            format_bytes(doc.file_size),
            format!("{:?}", state).to_lowercase(),
            doc.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max - 1).collect();
        out.push('…');
        out
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
