//! System prompts for the AI fallback.
//!
//! The minimal prompt carries rules only. The context prompt also embeds a
//! snapshot of the newest FAQs, notices and timetables, one
//! `[category] key → value` line per record, plus the current date and time.

use chrono::{DateTime, TimeZone};
use std::fmt::{Display, Write};

use crate::db::models::{Faq, Notice, Timetable};

pub const CONTEXT_FAQ_LIMIT: usize = 20;
pub const CONTEXT_NOTICE_LIMIT: usize = 10;
pub const CONTEXT_TIMETABLE_LIMIT: usize = 10;

pub const MINIMAL_PROMPT: &str = "\
You are CampusBot, a polite, minimal college helpdesk assistant.

RULES:
- NEVER invent links.
- NEVER mention date/time.
- NEVER create fake notices or files.
- Keep answers SHORT and SIMPLE.
- ONLY answer questions related to college, exams, syllabus, academics.
- If asked for a file and not found in DB, say: \"No related file found in the database.\"
";

/// Records injected into the context prompt, newest first.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    pub faqs: Vec<Faq>,
    pub notices: Vec<Notice>,
    pub timetables: Vec<Timetable>,
}

pub fn context_prompt<Tz>(
    snapshot: &ContextSnapshot,
    now: &DateTime<Tz>,
    public_url: Option<&str>,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut prompt = String::from(
        "You are CampusBot, the official helpdesk assistant of this college.\n\
         \n\
         RULES:\n\
         - Answer from the COLLEGE DATA below whenever it is relevant.\n\
         - For file-related answers, include the short link shown next to the record.\n\
         - Never invent links, notices or files that are not listed below.\n\
         - Politely decline questions unrelated to the college, exams, syllabus or academics.\n\
         - Keep answers short and simple.\n",
    );
    let _ = writeln!(
        prompt,
        "- The current date and time is {}. Mention it when the question depends on it.",
        now.format("%A, %d %B %Y %H:%M %Z")
    );

    prompt.push_str("\nCOLLEGE DATA\n");
    section(&mut prompt, "FAQs", snapshot.faqs.iter().map(faq_line));
    section(
        &mut prompt,
        "Notices",
        snapshot.notices.iter().map(|n| notice_line(n, public_url)),
    );
    section(
        &mut prompt,
        "Timetables",
        snapshot.timetables.iter().map(|t| timetable_line(t, public_url)),
    );
    prompt
}

fn section(prompt: &mut String, heading: &str, lines: impl Iterator<Item = String>) {
    let _ = writeln!(prompt, "\n{heading}:");
    let mut empty = true;
    for line in lines {
        empty = false;
        let _ = writeln!(prompt, "{line}");
    }
    if empty {
        prompt.push_str("(none)\n");
    }
}

fn faq_line(faq: &Faq) -> String {
    format!(
        "[faq:{}] {} → {}",
        label(faq.category.as_deref()),
        one_line(&faq.question),
        one_line(&faq.answer)
    )
}

fn notice_line(notice: &Notice, public_url: Option<&str>) -> String {
    format!(
        "[notice:{}] {} → {}{}",
        label(notice.category.as_deref()),
        one_line(&notice.title),
        one_line(&notice.description),
        link(notice.file_url.as_deref(), public_url)
    )
}

fn timetable_line(timetable: &Timetable, public_url: Option<&str>) -> String {
    let scope = [
        timetable.course.as_deref().unwrap_or_default(),
        timetable.branch.as_str(),
    ]
    .iter()
    .filter(|part| !part.trim().is_empty())
    .copied()
    .collect::<Vec<_>>()
    .join(" ");
    format!(
        "[timetable] {} → {} sem {}{}",
        one_line(&timetable.title),
        one_line(&scope),
        one_line(&timetable.semester),
        link(timetable.file_url.as_deref(), public_url)
    )
}

fn label(category: Option<&str>) -> &str {
    match category.map(str::trim) {
        Some(category) if !category.is_empty() => category,
        _ => "general",
    }
}

fn link(file_url: Option<&str>, public_url: Option<&str>) -> String {
    match file_url {
        Some(path) => format!(" ({})", super::public_file_url(path, public_url)),
        None => String::new(),
    }
}

/// Collapse newlines so each record stays on one prompt line.
fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
