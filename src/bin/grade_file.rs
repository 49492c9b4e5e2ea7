use anyhow::{anyhow, Context, Result};
use gradeshield_lib::init_logging;
use gradeshield_lib::services::text_processor::preview;
use gradeshield_lib::services::{gateway, ConfigStore};
use gradeshield_lib::GradingService;

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || has_flag(&args, "--help") {
        eprintln!(
            "Usage:\n  grade_file <submission> --question <text> [--reference <path>] [--student <name>] [--enhanced] [--screen-only] [--out <json_path>]\n  grade_file --set-key <provider> --key <value>\n\nNotes:\n  - Supported inputs: .ipynb, .pdf, .docx, plain text and source files.\n  - Provider API keys are read from the environment (e.g. GEMINI_API_KEY, SERPER_API_KEY) or the config file.\n  - Set GRADESHIELD_DISABLE_FILE_LOG=1 to log to the console only."
        );
        return Ok(());
    }

    init_logging();

    if let Some(provider) = parse_arg_value(&args, "--set-key") {
        let key = parse_arg_value(&args, "--key").ok_or_else(|| anyhow!("--key is required with --set-key"))?;
        let dir = ConfigStore::default_config_dir().ok_or_else(|| anyhow!("no config directory available"))?;
        ConfigStore::new(dir).set_api_key(&provider, &key).map_err(|e| anyhow!(e))?;
        println!("Stored API key for {}", provider);
        return Ok(());
    }

    let path = args[1].clone();
    let question = parse_arg_value(&args, "--question");
    let student = parse_arg_value(&args, "--student").unwrap_or_default();
    let out_path = parse_arg_value(&args, "--out");
    let screen_only = has_flag(&args, "--screen-only");

    let reference = match parse_arg_value(&args, "--reference") {
        Some(p) => std::fs::read_to_string(&p).with_context(|| format!("read reference {}", p))?,
        None => String::new(),
    };

    let mut config = match ConfigStore::default_config_dir() {
        Some(dir) => ConfigStore::new(dir).load().map_err(|e| anyhow!(e))?,
        None => Default::default(),
    };
    if has_flag(&args, "--enhanced") {
        config.pipeline.enhanced = true;
    }

    let bytes = std::fs::read(&path).with_context(|| format!("read submission {}", path))?;
    let file_name = std::path::Path::new(&path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "submission.txt".to_string());

    let service = GradingService::from_config(&config).context("load reference language model")?;

    let json = if screen_only {
        let extracted = gateway::extract(&file_name, &bytes)?;
        let references: Vec<String> = if reference.trim().is_empty() { vec![] } else { vec![reference] };
        let result = service.screen(&extracted.text, &references);

        println!("File: {} ({})", path, extracted.kind.describe());
        println!("Perplexity: {:.2}", result.perplexity);
        println!("Burstiness: {:.3}", result.burstiness);
        println!("Score: {:.2}", result.plagiarism_score);
        println!("Verdict: {}", result.category.label());
        println!("AI generated: {}", result.ai_generated);
        serde_json::to_string_pretty(&result)?
    } else {
        let question = question.ok_or_else(|| anyhow!("--question is required unless --screen-only is set"))?;
        let report = service
            .check_file(&file_name, &bytes, &question, &student, &reference)
            .await;

        println!("File: {}", path);
        if let Some(f) = &report.forensics {
            println!("Screening: score={:.2} verdict={}", f.plagiarism_score, f.category.label());
        }
        println!("Rejected: {}", report.rejected);
        println!("Grade: {}", report.evaluation.grade);
        println!("Feedback: {}", preview(&report.evaluation.feedback, 400));
        if let Some(id) = &report.document_id {
            println!("Stored as: {}", id);
        }
        serde_json::to_string_pretty(&report)?
    };

    if let Some(out_path) = out_path {
        std::fs::write(&out_path, json).with_context(|| format!("write {}", out_path))?;
        println!();
        println!("Wrote JSON: {}", out_path);
    }

    Ok(())
}
