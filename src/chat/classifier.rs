/// Phrases that mark a message as a request for a stored document.
const FILE_KEYWORDS: &[&str] = &[
    "notice",
    "pdf",
    "file",
    "pyq",
    "timetable",
    "question paper",
    "exam paper",
    "document",
];

/// Whether the message asks for a notice, timetable or past paper rather
/// than general information.
pub fn is_file_query(text: &str) -> bool {
    let text = text.to_lowercase();
    FILE_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}
