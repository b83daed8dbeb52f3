//! Raw SQL classification for interactive confirmation.
//!
//! Generated migration and sync SQL never passes through here; this is for
//! statements a user types or pastes.
//!
//! | Statement                      | Reason                              |
//! |--------------------------------|-------------------------------------|
//! | `UPDATE` without `WHERE`       | [`ConfirmReason::UpdateWithoutWhere`] |
//! | `DELETE` without `WHERE`       | [`ConfirmReason::DeleteWithoutWhere`] |
//! | `DROP ...`                     | [`ConfirmReason::Drop`]             |
//! | `TRUNCATE ...`                 | [`ConfirmReason::Truncate`]         |
//! | `ALTER ...`                    | [`ConfirmReason::Alter`]            |

use std::fmt;

use serde::Serialize;

/// Why a statement needs confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmReason {
    UpdateWithoutWhere,
    DeleteWithoutWhere,
    Drop,
    Truncate,
    Alter,
}

impl fmt::Display for ConfirmReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConfirmReason::UpdateWithoutWhere => "UPDATE without WHERE affects every row",
            ConfirmReason::DeleteWithoutWhere => "DELETE without WHERE removes every row",
            ConfirmReason::Drop => "DROP removes a database object",
            ConfirmReason::Truncate => "TRUNCATE removes every row",
            ConfirmReason::Alter => "ALTER changes a database object",
        };
        f.write_str(text)
    }
}

/// Classify one statement. `None` means it can run without confirmation.
pub fn classify_statement(sql: &str) -> Option<ConfirmReason> {
    let words = keywords(sql);
    let first = words.first()?;
    let has_where = || words.iter().any(|w| w == "WHERE");

    match first.as_str() {
        "UPDATE" if !has_where() => Some(ConfirmReason::UpdateWithoutWhere),
        "DELETE" if !has_where() => Some(ConfirmReason::DeleteWithoutWhere),
        "DROP" => Some(ConfirmReason::Drop),
        "TRUNCATE" => Some(ConfirmReason::Truncate),
        "ALTER" => Some(ConfirmReason::Alter),
        _ => None,
    }
}

/// Whether a statement needs confirmation.
pub fn requires_confirmation(sql: &str) -> bool {
    classify_statement(sql).is_some()
}

/// Classify every `;`-separated statement of a script, in order.
pub fn classify_script(sql: &str) -> Vec<(String, ConfirmReason)> {
    split_statements(sql)
        .into_iter()
        .filter_map(|stmt| classify_statement(&stmt).map(|r| (stmt, r)))
        .collect()
}

/// Bare words outside quotes and comments, upper-cased.
fn keywords(sql: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();

    let flush = |current: &mut String, words: &mut Vec<String>| {
        if !current.is_empty() {
            words.push(current.to_uppercase());
            current.clear();
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                flush(&mut current, &mut words);
                for d in chars.by_ref() {
                    if d == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                flush(&mut current, &mut words);
                for d in chars.by_ref() {
                    if d == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                flush(&mut current, &mut words);
                chars.next();
                let mut prev = ' ';
                for d in chars.by_ref() {
                    if prev == '*' && d == '/' {
                        break;
                    }
                    prev = d;
                }
            }
            c if c.is_alphanumeric() || c == '_' => current.push(c),
            _ => flush(&mut current, &mut words),
        }
    }
    flush(&mut current, &mut words);
    words
}

/// Split on semicolons outside quotes and comments.
fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    current.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    for d in chars.by_ref() {
                        if d == '\n' {
                            break;
                        }
                    }
                    current.push('\n');
                }
                ';' => {
                    if !current.trim().is_empty() {
                        statements.push(current.trim().to_string());
                    }
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        statements.push(current.trim().to_string());
    }
    statements
}
