//! List-endpoint query helpers: the comma-separated multi-key `ordering`
//! parameter and page-number bounds.

use crate::error::AppError;

/// Turns `"-price,title"` into an `ORDER BY` clause, mapping exposed field
/// names to columns through `allowed`. Field names never reach the SQL text
/// directly; anything outside the whitelist is rejected.
pub fn parse_ordering(raw: &str, allowed: &[(&str, &str)]) -> Result<String, AppError> {
    let mut clauses = Vec::new();

    for key in raw.split(',') {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let (name, direction) = match key.strip_prefix('-') {
            Some(rest) => (rest, "DESC"),
            None => (key, "ASC"),
        };

        let column = allowed
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, column)| *column)
            .ok_or_else(|| AppError::BadRequest(format!("Cannot order by '{name}'")))?;

        clauses.push(format!("{column} {direction}"));
    }

    if clauses.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!(" ORDER BY {}", clauses.join(", ")))
    }
}

/// LIMIT/OFFSET for a 1-based page number. Out-of-range values clamp rather
/// than error; an absent page size falls back to the configured default.
pub fn page_bounds(page: Option<u32>, per_page: Option<u32>, default_size: u32) -> (i64, i64) {
    let size = i64::from(per_page.unwrap_or(default_size).max(1));
    let page = i64::from(page.unwrap_or(1).max(1));
    (size, (page - 1) * size)
}
