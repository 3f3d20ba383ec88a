//! Response parsing for SQL generation.
//!
//! Models are asked to answer with `SQL:` and `Explanation:` lines. Answers
//! that ignore the format but contain a fenced code block are accepted too.

use crate::error::{AppError, Result};
use crate::llm::GeneratedSql;

const DEFAULT_EXPLANATION: &str = "SQL query generated from natural language";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Sql,
    Explanation,
}

/// Extracts the SQL text and explanation from a model answer.
///
/// Lines following a label continue that section until the next label.
/// Code fences inside the SQL section are dropped. An answer without any
/// SQL is an error.
pub fn parse_generated_sql(response: &str) -> Result<GeneratedSql> {
    let mut sql_lines: Vec<&str> = Vec::new();
    let mut explanation_lines: Vec<&str> = Vec::new();
    let mut section = Section::Preamble;

    for line in response.lines() {
        let trimmed = line.trim();

        if let Some(rest) = strip_label(trimmed, "SQL:") {
            section = Section::Sql;
            sql_lines.clear();
            sql_lines.push(rest);
        } else if let Some(rest) = strip_label(trimmed, "Explanation:") {
            section = Section::Explanation;
            explanation_lines.clear();
            explanation_lines.push(rest);
        } else {
            match section {
                Section::Sql => sql_lines.push(line.trim_end()),
                Section::Explanation => explanation_lines.push(trimmed),
                Section::Preamble => {}
            }
        }
    }

    let mut sql = strip_fences(&sql_lines);
    if sql.is_empty() {
        sql = extract_code_block(response, "sql")
            .or_else(|| extract_code_block(response, ""))
            .map(|block| block.trim().to_string())
            .unwrap_or_default();
    }

    if sql.is_empty() {
        return Err(AppError::llm("Model response did not contain a SQL query"));
    }

    let explanation = explanation_lines
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Ok(GeneratedSql {
        sql,
        explanation: if explanation.is_empty() {
            DEFAULT_EXPLANATION.to_string()
        } else {
            explanation
        },
    })
}

/// Case-insensitive label match returning the text after the label.
fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let prefix = line.get(..label.len())?;
    prefix
        .eq_ignore_ascii_case(label)
        .then(|| line[label.len()..].trim())
}

fn strip_fences(lines: &[&str]) -> String {
    lines
        .iter()
        .filter(|l| !l.trim_start().starts_with("```"))
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Extracts the first markdown code block tagged `lang`.
///
/// An empty `lang` matches only blocks without a language tag.
fn extract_code_block(text: &str, lang: &str) -> Option<String> {
    let start_pattern = format!("```{lang}");
    let start_idx = text.find(&start_pattern)?;
    let after_pattern = start_idx + start_pattern.len();

    let content_start = text[after_pattern..]
        .find('\n')
        .map(|i| after_pattern + i + 1)?;

    if lang.is_empty() && !text[after_pattern..content_start].trim().is_empty() {
        return None;
    }

    let end_idx = text[content_start..].find("```")?;
    Some(text[content_start..content_start + end_idx].to_string())
}
