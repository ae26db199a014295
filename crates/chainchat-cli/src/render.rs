use std::io::{self, Write};

use chainchat_core::{ChatEvent, DownloadProgress, ModelRow};
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

const BAR_WIDTH: usize = 30;

/// Prints controller events as they arrive
#[derive(Debug, Default)]
pub struct View {
    streaming: bool,
    progress_shown: bool,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, event: &ChatEvent) {
        match event {
            ChatEvent::Loading { active: true } => {
                println!("  Processing your request... Please wait.");
                println!();
            }
            ChatEvent::Chunk { content } => {
                print!("{}", content);
                let _ = io::stdout().flush();
                self.streaming = true;
            }
            ChatEvent::GenerationDone => self.end_line(),
            ChatEvent::Progress { progress } => {
                print!("\r\x1B[2K  {}", progress_line(progress));
                let _ = io::stdout().flush();
                self.progress_shown = true;
            }
            ChatEvent::PullDone { phase } => {
                self.end_line();
                println!("  Pull {}", phase.label());
            }
            ChatEvent::Error { message } => {
                self.end_line();
                eprintln!("  {}", message);
            }
            ChatEvent::Loading { active: false }
            | ChatEvent::SelectionCleared
            | ChatEvent::AvailableModels { .. } => {}
        }
    }

    fn end_line(&mut self) {
        if self.streaming || self.progress_shown {
            println!();
        }
        self.streaming = false;
        self.progress_shown = false;
    }
}

pub fn progress_line(progress: &DownloadProgress) -> String {
    let Some(fraction) = progress.fraction() else {
        return progress.status.clone();
    };

    let filled = (fraction * BAR_WIDTH as f64).round() as usize;
    format!(
        "{} [{}{}] {:>5.1}%  {}",
        progress.status,
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        fraction * 100.0,
        progress.gb_summary()
    )
}

pub fn model_table(rows: &[ModelRow<'_>]) -> String {
    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        let mark = if row.selected { 'x' } else { ' ' };
        let info = row
            .info
            .map(|info| info.summary())
            .unwrap_or_else(|| "-".to_string());
        let availability = match row.needs_pull() {
            false => "(Available)".to_string(),
            true => format!("(Not Available - `pull {}`)", i + 1),
        };
        out.push_str(&format!(
            "  {:<3} [{}] {:<24} {:<50} {}\n",
            i + 1,
            mark,
            row.name,
            info,
            availability
        ));
    }
    out
}

/// Plain-text rendering of a markdown response for the terminal
pub fn markdown(source: &str) -> String {
    let mut out = String::new();
    let mut lists: Vec<Option<u64>> = Vec::new();
    let mut quotes: Vec<usize> = Vec::new();
    let mut links: Vec<(usize, String)> = Vec::new();
    let mut in_code = false;
    let mut heading_start = 0;
    let mut columns = 0;

    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES | Options::ENABLE_TASKLISTS;
    for event in Parser::new_ext(source, options) {
        match event {
            Event::Start(Tag::Heading { .. }) => heading_start = out.len(),
            Event::End(TagEnd::Heading(level)) => {
                let width = out[heading_start..].chars().count();
                let underline = if level == HeadingLevel::H1 { "=" } else { "-" };
                out.push('\n');
                out.push_str(&underline.repeat(width));
                out.push_str("\n\n");
            }
            Event::Start(Tag::CodeBlock(_)) => in_code = true,
            Event::End(TagEnd::CodeBlock) => {
                in_code = false;
                out.push('\n');
            }
            Event::Start(Tag::List(start)) => lists.push(start),
            Event::End(TagEnd::List(_)) => {
                lists.pop();
                if lists.is_empty() {
                    out.push('\n');
                }
            }
            Event::Start(Tag::Item) => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&"  ".repeat(lists.len().saturating_sub(1)));
                match lists.last_mut() {
                    Some(Some(n)) => {
                        out.push_str(&format!("{}. ", n));
                        *n += 1;
                    }
                    _ => out.push_str("• "),
                }
            }
            Event::End(TagEnd::Item) => {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Event::TaskListMarker(done) => out.push_str(if done { "[x] " } else { "[ ] " }),
            Event::End(TagEnd::Paragraph) => {
                out.push('\n');
                if lists.is_empty() {
                    out.push('\n');
                }
            }
            Event::Start(Tag::BlockQuote { .. }) => quotes.push(out.len()),
            Event::End(TagEnd::BlockQuote { .. }) => {
                let start = quotes.pop().unwrap_or(0);
                let quoted: String = out[start..]
                    .trim_end()
                    .lines()
                    .map(|line| if line.is_empty() { ">".to_string() } else { format!("> {}", line) })
                    .collect::<Vec<_>>()
                    .join("\n");
                out.truncate(start);
                out.push_str(&quoted);
                out.push_str("\n\n");
            }
            Event::Start(Tag::Link { dest_url, .. }) => links.push((out.len(), dest_url.to_string())),
            Event::End(TagEnd::Link) => {
                if let Some((start, url)) = links.pop() {
                    // autolinks already show the address
                    if out[start..] != url {
                        out.push_str(&format!(" ({})", url));
                    }
                }
            }
            Event::Start(Tag::Strikethrough) | Event::End(TagEnd::Strikethrough) => out.push_str("~~"),
            Event::Start(Tag::Table(alignments)) => columns = alignments.len(),
            Event::Start(Tag::TableHead) | Event::Start(Tag::TableRow) => out.push('|'),
            Event::Start(Tag::TableCell) => out.push(' '),
            Event::End(TagEnd::TableCell) => {
                out.truncate(out.trim_end_matches(' ').len());
                out.push_str(" |");
            }
            Event::End(TagEnd::TableHead) => {
                out.push_str("\n|");
                out.push_str(&" --- |".repeat(columns));
                out.push('\n');
            }
            Event::End(TagEnd::TableRow) => out.push('\n'),
            Event::End(TagEnd::Table) => out.push('\n'),
            Event::Text(text) if in_code => {
                for line in text.lines() {
                    out.push_str("    ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            Event::Text(text) => out.push_str(&text),
            Event::Code(code) => {
                out.push('`');
                out.push_str(&code);
                out.push('`');
            }
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::Rule => out.push_str("────────\n\n"),
            _ => {}
        }
    }

    out.trim_end().to_string()
}
