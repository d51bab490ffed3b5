//! Command handlers for the CLI

use artifact_signer::{
    fingerprint, BatchOperation, BatchOptions, ExportFormat, InMemoryKeyManager,
    ServiceContext, SessionStatusReport, SignatureConfig, SignatureService, StaticTrustManager,
    VerifyOptions,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{Cli, Commands, SessionCommands};

type CmdResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Dispatch a parsed command line
pub async fn run_command(cli: Cli) -> CmdResult {
    let Cli {
        keyring,
        signatures_dir,
        trust_file,
        json,
        command,
    } = cli;

    let open = || open_service(&keyring, signatures_dir.clone(), trust_file.as_deref());
    match command {
        Commands::Keygen {
            key_id,
            passphrase,
            current,
        } => keygen(&keyring, &key_id, passphrase.as_deref(), current, json).await,
        Commands::Sign {
            files,
            key_id,
            passphrase,
        } => {
            let service = open().await?;
            sign(&service, &files, key_id.as_deref(), passphrase.as_deref(), json).await
        }
        Commands::Verify {
            files,
            signature,
            public_key,
            no_trust,
        } => {
            let service = open().await?;
            let options = verify_options(public_key, no_trust);
            verify(&service, &files, signature.as_deref(), &options, json).await
        }
        Commands::Batch {
            file,
            concurrency,
            stop_on_error,
            optimize,
            passphrase,
        } => {
            let service = open().await?;
            let options = BatchOptions {
                concurrency,
                continue_on_error: !stop_on_error,
                optimize,
            };
            batch(&service, &file, options, passphrase.as_deref(), json).await
        }
        Commands::Session { action } => {
            let service = open().await?;
            session(&service, action, json).await
        }
        Commands::Stats => {
            let service = open().await?;
            print_json(&service.stats().await)
        }
    }
}

/// Build the service from environment config, the keyring and an optional
/// trust allow-list
async fn open_service(
    keyring: &Path,
    signatures_dir: Option<PathBuf>,
    trust_file: Option<&Path>,
) -> Result<SignatureService, Box<dyn std::error::Error + Send + Sync>> {
    let mut config = SignatureConfig::from_env();
    if let Some(dir) = signatures_dir {
        config = config.with_signatures_dir(dir);
    }

    let keys = load_or_empty(keyring).await?;
    let mut ctx = ServiceContext::new(config, Arc::new(keys));
    if let Some(path) = trust_file {
        let trusted = load_trust_file(path).await?;
        info!("Trusting {} keys from {}", trusted.len(), path.display());
        ctx = ctx.with_trust_manager(Arc::new(StaticTrustManager::with_trusted(trusted)));
    }

    Ok(SignatureService::open(ctx).await?)
}

async fn load_or_empty(
    keyring: &Path,
) -> Result<InMemoryKeyManager, Box<dyn std::error::Error + Send + Sync>> {
    if tokio::fs::try_exists(keyring).await? {
        Ok(InMemoryKeyManager::load_keyring(keyring).await?)
    } else {
        warn!("Keyring {} not found, starting empty", keyring.display());
        Ok(InMemoryKeyManager::new())
    }
}

/// Read a JSON array of hex public keys
pub async fn load_trust_file(
    path: &Path,
) -> Result<Vec<String>, Box<dyn std::error::Error + Send + Sync>> {
    let content = tokio::fs::read_to_string(path).await?;
    let keys: Vec<String> = serde_json::from_str(&content)?;
    Ok(keys.into_iter().map(|k| k.trim().to_lowercase()).collect())
}

fn verify_options(public_key: Option<String>, no_trust: bool) -> VerifyOptions {
    let mut options = VerifyOptions::default();
    if let Some(pk) = public_key {
        options = options.with_public_key(pk);
    }
    if no_trust {
        options = options.without_trust();
    }
    options
}

fn print_json<T: Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn trust_label(trust: Option<bool>) -> &'static str {
    match trust {
        Some(true) => "trusted",
        Some(false) => "untrusted",
        None => "not checked",
    }
}

// ============ Keys ============

async fn keygen(
    keyring: &Path,
    key_id: &str,
    passphrase: Option<&str>,
    current: bool,
    json: bool,
) -> CmdResult {
    let keys = load_or_empty(keyring).await?;
    let public_key = keys.generate_key(key_id, passphrase).await?;
    if current {
        keys.set_current_key(key_id).await?;
    }
    keys.save_keyring(keyring).await?;

    let fp = fingerprint(&public_key)?;
    if json {
        return print_json(&serde_json::json!({
            "keyId": key_id,
            "publicKey": public_key,
            "fingerprint": fp,
            "keyring": keyring,
        }));
    }
    println!("Generated key {}", key_id);
    println!("  Public key:  {}", public_key);
    println!("  Fingerprint: {}", fp);
    println!("  Keyring:     {}", keyring.display());
    Ok(())
}

// ============ Signing ============

async fn sign(
    service: &SignatureService,
    files: &[PathBuf],
    key_id: Option<&str>,
    passphrase: Option<&str>,
    json: bool,
) -> CmdResult {
    if let [file] = files {
        let signed = service.sign_file(file, key_id, passphrase).await?;
        if json {
            return print_json(&signed);
        }
        println!(
            "Signed {} with {} -> {}",
            signed.file_path.display(),
            signed.record.key_id(),
            signed.signature_path.display()
        );
        return Ok(());
    }

    let summary = service.sign_files_batch(files, key_id, passphrase).await?;
    if json {
        print_json(&summary)?;
    } else {
        for detail in &summary.details {
            match (&detail.signature_path, &detail.error) {
                (Some(sig), _) => {
                    println!("  ok    {} -> {}", detail.file_path.display(), sig.display())
                }
                (None, Some(e)) => {
                    println!("  fail  {}: {}", detail.file_path.display(), e.message)
                }
                (None, None) => println!("  fail  {}", detail.file_path.display()),
            }
        }
        println!(
            "Signed {}/{} files ({} failed)",
            summary.successful, summary.total, summary.failed
        );
    }
    if summary.failed > 0 {
        return Err(format!(
            "{} of {} files failed to sign",
            summary.failed, summary.total
        )
        .into());
    }
    Ok(())
}

// ============ Verification ============

async fn verify(
    service: &SignatureService,
    files: &[PathBuf],
    signature: Option<&Path>,
    options: &VerifyOptions,
    json: bool,
) -> CmdResult {
    if let [file] = files {
        let verification = service
            .verify_file_signature(file, signature, options)
            .await?;
        if json {
            return print_json(&verification);
        }
        println!(
            "{}: VALID (key {}, {})",
            verification.file_path.display(),
            verification.key_id,
            trust_label(verification.result.trust_verified)
        );
        return Ok(());
    }

    if signature.is_some() {
        return Err("--signature applies to a single file only".into());
    }
    let summary = service.verify_files_batch(files, options).await?;
    if json {
        print_json(&summary)?;
    } else {
        for detail in &summary.details {
            let reason = detail
                .failure_reason
                .clone()
                .or_else(|| detail.error.as_ref().map(|e| e.message.clone()));
            match reason {
                Some(reason) => println!(
                    "  {:?}  {}: {}",
                    detail.status,
                    detail.file_path.display(),
                    reason
                ),
                None => println!(
                    "  {:?}  {} ({})",
                    detail.status,
                    detail.file_path.display(),
                    trust_label(detail.trust_verified)
                ),
            }
        }
        println!(
            "{} valid, {} invalid, {} errors ({} trusted, {} untrusted)",
            summary.valid, summary.invalid, summary.errors, summary.trusted, summary.untrusted
        );
    }
    if summary.valid != summary.total {
        let failed = summary.total - summary.valid;
        return Err(format!("{} of {} files did not verify", failed, summary.total).into());
    }
    Ok(())
}

// ============ Batch ============

/// Fill in `passphrase` for sign operations that do not name their own
pub fn apply_passphrase(operations: &mut [BatchOperation], passphrase: Option<&str>) {
    let Some(passphrase) = passphrase else {
        return;
    };
    for op in operations.iter_mut() {
        if let BatchOperation::SignFile {
            passphrase: slot @ None,
            ..
        } = op
        {
            *slot = Some(passphrase.to_string());
        }
    }
}

async fn batch(
    service: &SignatureService,
    file: &Path,
    options: BatchOptions,
    passphrase: Option<&str>,
    json: bool,
) -> CmdResult {
    let content = tokio::fs::read_to_string(file).await?;
    let mut operations: Vec<BatchOperation> = serde_json::from_str(&content)?;
    apply_passphrase(&mut operations, passphrase);

    let result = service.execute_batch(operations, options).await?;
    if json {
        return print_json(&result);
    }
    println!("Batch {}", result.batch_id);
    for detail in &result.details {
        let note = detail
            .error
            .as_ref()
            .map(|e| format!(": {}", e.message))
            .unwrap_or_default();
        println!(
            "  #{:<3} {:<11} {:<15} {}{}",
            detail.index,
            detail.operation.to_string(),
            format!("{:?}", detail.status),
            detail.target,
            note
        );
    }
    println!(
        "{} ops: {} ok, {} failed, {} skipped in {}ms",
        result.total_operations,
        result.successful,
        result.failed,
        result.skipped,
        result.processing_time_ms
    );
    Ok(())
}

// ============ Sessions ============

fn print_session(report: &SessionStatusReport) {
    let reason = report
        .close_reason
        .as_ref()
        .map(|r| format!(" ({})", r))
        .unwrap_or_default();
    println!("Session {}", report.session_id);
    println!("  File:       {}", report.file_path.display());
    println!("  Status:     {}{}", report.status, reason);
    println!(
        "  Signatures: {}/{}",
        report.signatures_collected, report.min_signatures_required
    );
    if !report.signers.is_empty() {
        println!("  Signers:    {}", report.signers.join(", "));
    }
    if !report.missing_required_signers.is_empty() {
        println!(
            "  Missing:    {}",
            report.missing_required_signers.join(", ")
        );
    }
    println!("  Expires:    {}", report.expires_at.to_rfc3339());
}

async fn session(service: &SignatureService, action: SessionCommands, json: bool) -> CmdResult {
    match action {
        SessionCommands::Create {
            file,
            min,
            required,
        } => {
            let session = service
                .create_multi_signature_session(&file, min, &required)
                .await?;
            if json {
                return print_json(&session);
            }
            println!("Created session {}", session.session_id);
            println!(
                "  Needs {} signatures, expires {}",
                session.min_signatures_required,
                session.expires_at.to_rfc3339()
            );
        }
        SessionCommands::Add {
            session_id,
            key_id,
            passphrase,
        } => {
            let outcome = service
                .add_signature_to_session(&session_id, &key_id, passphrase.as_deref())
                .await?;
            if json {
                return print_json(&outcome);
            }
            println!(
                "Added {} to {} ({}/{})",
                outcome.key_id,
                outcome.session_id,
                outcome.signatures_collected,
                outcome.min_signatures_required
            );
            if let Some(archive) = &outcome.archive_path {
                println!("Session completed, archived to {}", archive.display());
            }
        }
        SessionCommands::Status { session_id } => {
            let report = service.session_status(&session_id).await?;
            if json {
                return print_json(&report);
            }
            print_session(&report);
        }
        SessionCommands::List => {
            let sessions = service.list_active_sessions().await;
            if json {
                return print_json(&sessions);
            }
            if sessions.is_empty() {
                println!("No active sessions");
            }
            for report in &sessions {
                println!(
                    "{}  {}/{}  {}",
                    report.session_id,
                    report.signatures_collected,
                    report.min_signatures_required,
                    report.file_path.display()
                );
            }
        }
        SessionCommands::Close { session_id, reason } => {
            let session = service.close_session(&session_id, &reason).await?;
            if json {
                return print_json(&session);
            }
            println!("Closed session {} ({})", session.session_id, reason);
        }
        SessionCommands::Cleanup => {
            let report = service.cleanup_expired_sessions().await?;
            if json {
                return print_json(&report);
            }
            println!("Closed {} expired sessions", report.cleaned_count);
            for id in &report.session_ids {
                println!("  {}", id);
            }
        }
        SessionCommands::Export { session_id, format } => {
            let format = ExportFormat::from_str(&format)
                .ok_or_else(|| format!("Unknown export format: {}", format))?;
            let export = service.export_session(&session_id, format).await?;
            println!("{}", export.render()?);
        }
        SessionCommands::Verify {
            session_id,
            no_trust,
        } => {
            let mut options = VerifyOptions::lenient();
            if no_trust {
                options = options.without_trust();
            }
            let verification = service.verify_session(&session_id, &options).await?;
            if json {
                print_json(&verification)?;
            } else {
                for check in &verification.signatures {
                    println!(
                        "  {:<20} {} ({})",
                        check.key_id,
                        if check.valid { "valid" } else { "INVALID" },
                        trust_label(check.trust_verified)
                    );
                }
                println!(
                    "{}/{} valid, threshold {}: {}",
                    verification.valid_signatures,
                    verification.total_signatures,
                    verification.min_signatures_required,
                    if verification.overall_valid { "VALID" } else { "INVALID" }
                );
            }
            if !verification.overall_valid {
                return Err(format!("Session {} does not verify", session_id).into());
            }
        }
        SessionCommands::Stats => {
            let stats = service.multisig().stats().await;
            if json {
                return print_json(&stats);
            }
            println!("Sessions:   {}", stats.total_sessions);
            println!("  Active:    {}", stats.active);
            println!("  Completed: {}", stats.completed);
            println!("  Closed:    {} ({} expired)", stats.closed, stats.expired);
            println!("Signatures: {} (avg {:.2})", stats.total_signatures, stats.average_signatures);
            println!("Success:    {:.1}%", stats.success_rate * 100.0);
        }
    }
    Ok(())
}
