use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use session_core::{
    load_settings, report, HttpQuizBackend, QuizController, SessionEvent,
};
use shared::domain::{Difficulty, SourceDocument, Stage};
use tokio::sync::broadcast;

#[derive(Parser, Debug)]
#[command(name = "quizforge", about = "Turn a document into a timed multiple-choice quiz")]
struct Args {
    /// Document to build the quiz from
    file: PathBuf,
    /// Backend base URL (overrides config file and environment)
    #[arg(long)]
    backend_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(url) = args.backend_url {
        settings.backend_url = url;
    }
    let backend = Arc::new(HttpQuizBackend::new(&settings)?);
    let controller = QuizController::new(backend);
    spawn_notice_printer(&controller);

    let bytes = fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let filename = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    loop {
        match controller.stage().await {
            Stage::Upload => {
                controller
                    .submit_upload(SourceDocument {
                        filename: filename.clone(),
                        bytes: bytes.clone(),
                    })
                    .await?;
                println!("Scanning {filename} for topics...");
            }
            Stage::Scanning | Stage::Starting => {
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
            Stage::Topics => prompt_topics(&controller).await?,
            Stage::Difficulty => prompt_difficulty(&controller).await?,
            Stage::Count => prompt_count(&controller).await?,
            Stage::Timer => prompt_timer(&controller).await?,
            Stage::Language => prompt_language(&controller).await?,
            Stage::Test => run_test(&controller).await?,
            Stage::Results => {
                if !results_menu(&controller).await? {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn spawn_notice_printer(controller: &Arc<QuizController>) {
    let mut events = controller.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::ExtractionFailed { message }) => {
                    eprintln!("note: topic extraction failed ({message}); continuing without detected topics");
                }
                Ok(SessionEvent::GenerationFailed { message }) => {
                    eprintln!("note: question generation failed ({message}); placeholder questions will be used");
                }
                Ok(SessionEvent::TranslationFailed { message }) => {
                    eprintln!("note: translation failed ({message}); keeping the original language");
                }
                Ok(SessionEvent::EmailSent { to }) => eprintln!("report sent to {to}"),
                Ok(SessionEvent::EmailFailed { message }) => {
                    eprintln!("note: email delivery failed ({message})");
                }
                Ok(SessionEvent::CountdownTick { remaining_seconds }) => {
                    if remaining_seconds > 0
                        && (remaining_seconds % 60 == 0 || remaining_seconds == 10)
                    {
                        eprintln!("{} left", report::format_duration(remaining_seconds));
                    }
                }
                Ok(SessionEvent::TimeExpired) => {
                    eprintln!("time is up, submitting your answers");
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn prompt_topics(controller: &Arc<QuizController>) -> Result<()> {
    let session = controller.session().await;
    if session.extracted_topics.is_empty() {
        println!("No topics were detected in the document; enter your own below.");
    } else {
        println!("Detected topics:");
        for (index, topic) in session.extracted_topics.iter().enumerate() {
            println!("  {}. {topic}", index + 1);
        }
    }
    let line = prompt("Pick topics (numbers and/or custom names, comma-separated): ")?;
    let session = controller.session().await;
    let mut picks = Vec::new();
    for raw in line.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match raw.parse::<usize>() {
            Ok(n) if n >= 1 && n <= session.extracted_topics.len() => {
                picks.push(session.extracted_topics[n - 1].clone());
            }
            _ => picks.push(raw.to_string()),
        }
    }
    if let Err(err) = controller.choose_topics(picks).await {
        println!("{err}");
    }
    Ok(())
}

async fn prompt_difficulty(controller: &Arc<QuizController>) -> Result<()> {
    let answer = prompt("Difficulty [easy/medium/hard] (default medium): ")?;
    let difficulty = match answer.to_ascii_lowercase().as_str() {
        "easy" => Difficulty::Easy,
        "hard" => Difficulty::Hard,
        _ => Difficulty::Medium,
    };
    controller.choose_difficulty(difficulty).await?;
    Ok(())
}

async fn prompt_count(controller: &Arc<QuizController>) -> Result<()> {
    let answer = prompt("How many questions? [5-50] (default 10): ")?;
    let raw = answer.parse::<i64>().unwrap_or(10);
    controller.choose_count(raw).await?;
    Ok(())
}

async fn prompt_timer(controller: &Arc<QuizController>) -> Result<()> {
    let answer = prompt("Time limit in minutes, 0 for unlimited (default 30): ")?;
    let raw = answer.parse::<i64>().unwrap_or(30);
    controller.choose_timer(raw).await?;
    Ok(())
}

async fn prompt_language(controller: &Arc<QuizController>) -> Result<()> {
    let answer = prompt("Language code, blank to keep the document language: ")?;
    let language = if answer.is_empty() { None } else { Some(answer) };
    controller.choose_language(language).await?;
    println!("Preparing your quiz...");
    Ok(())
}

async fn run_test(controller: &Arc<QuizController>) -> Result<()> {
    let session = controller.session().await;
    if session.used_fallback_questions {
        println!("(Using placeholder questions; the generation service was unavailable.)");
    }
    println!("\n{} questions. Good luck!\n", session.questions.len());
    for (index, question) in session.questions.iter().enumerate() {
        if controller.stage().await != Stage::Test {
            return Ok(());
        }
        println!(
            "{}/{} [{}] {}",
            index + 1,
            session.questions.len(),
            question.topic,
            question.prompt
        );
        for (key, text) in &question.options {
            println!("   {key}) {text}");
        }
        loop {
            let answer = prompt("Answer (A-D, f to flag, blank to skip): ")?;
            if controller.stage().await != Stage::Test {
                return Ok(());
            }
            if answer.is_empty() {
                break;
            }
            if answer.eq_ignore_ascii_case("f") {
                controller.toggle_flag(&question.id).await?;
                println!("   flagged");
                continue;
            }
            let key = answer.to_ascii_uppercase();
            if question.options.contains_key(&key) {
                controller.record_answer(&question.id, key).await?;
                break;
            }
            println!("   pick one of the listed options");
        }
        println!();
    }
    if controller.stage().await == Stage::Test {
        controller.finish().await?;
    }
    Ok(())
}

async fn results_menu(controller: &Arc<QuizController>) -> Result<bool> {
    let session = controller.session().await;
    println!("\n{}", report::results_report(&session));
    println!("  1) retake the same topics");
    println!("  2) retake the topics you missed");
    println!("  3) email the report");
    println!("  4) start over");
    println!("  q) quit");
    loop {
        match prompt("> ")?.as_str() {
            "1" => {
                controller.retake_same_topics().await?;
                return Ok(true);
            }
            "2" => {
                if controller.retake_failed_topics().await? {
                    return Ok(true);
                }
                println!("Every topic is at or above 50%; nothing to retake.");
            }
            "3" => {
                let to = prompt("Send to: ")?;
                match controller.send_results_email(&to).await {
                    Ok(()) => println!("Sending..."),
                    Err(err) => println!("{err}"),
                }
            }
            "4" => {
                controller.restart().await;
                return Ok(true);
            }
            "q" | "" => return Ok(false),
            _ => println!("pick 1-4 or q"),
        }
    }
}
