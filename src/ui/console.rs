//! 终端交互面
//!
//! 标题与错误用 crossterm 着色输出到 stdout，输入按行读取 stdin；stdin 关闭（EOF）时确认视为 abort。

use std::io::Write;

use async_trait::async_trait;
use crossterm::style::Stylize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::ui::{Choice, Confirmation, UserInteraction};

pub struct ConsoleInteraction {
    input: Mutex<Lines<BufReader<Stdin>>>,
}

impl Default for ConsoleInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleInteraction {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    async fn read_line(&self, prompt: &str) -> Option<String> {
        print!("{} ", prompt.bold());
        let _ = std::io::stdout().flush();
        let mut input = self.input.lock().await;
        match input.next_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to read stdin: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl UserInteraction for ConsoleInteraction {
    async fn show_information(&self, body: &str, title: &str) {
        println!("\n{}", format!("== {} ==", title).cyan().bold());
        println!("{}", body);
    }

    async fn report_error(&self, summary: &str, title: &str, detail: Option<&str>) {
        println!("\n{}", format!("!! {} !!", title).red().bold());
        println!("{}", summary.red());
        if let Some(detail) = detail {
            println!("{}", detail.dark_grey());
        }
    }

    async fn get_confirmation(&self, body: &str, prompt: &str) -> Confirmation {
        println!("\n{}", "== Review ==".yellow().bold());
        println!("{}", body);
        println!("\n{}", prompt);
        loop {
            let Some(answer) = self.read_line("[c]onfirm / [r]edo with feedback / [a]bort >").await else {
                return Confirmation::abort();
            };
            match Choice::parse(&answer) {
                Some(Choice::Redo) => {
                    let feedback = self.read_line("Feedback:").await.unwrap_or_default();
                    let feedback = feedback.trim();
                    return Confirmation {
                        choice: Choice::Redo,
                        feedback: (!feedback.is_empty()).then(|| feedback.to_string()),
                    };
                }
                Some(choice) => {
                    return Confirmation {
                        choice,
                        feedback: None,
                    }
                }
                None => println!("{}", "Please answer c, r or a.".dark_yellow()),
            }
        }
    }

    async fn escalate(&self, question: &str, context: &str) -> String {
        println!("\n{}", "== Question ==".magenta().bold());
        if !context.is_empty() {
            println!("{}", context.dark_grey());
        }
        println!("{}", question);
        self.read_line(">").await.unwrap_or_default().trim().to_string()
    }
}
