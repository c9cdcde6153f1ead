use std::collections::BTreeMap;

/// Substitute `${NAME}` placeholders in SQL text. Call-site values in `extra`
/// win over configuration values in `base` for the same name; unknown
/// placeholders are left untouched. Substitution is textual and unescaped, so
/// only operator-controlled configuration and internally computed ISO dates
/// may ever flow through here, never request or user input.
pub fn render_sql(sql: &str, base: &BTreeMap<String, String>, extra: &BTreeMap<String, String>) -> String {
    let mut merged = base.clone();
    for (key, value) in extra {
        merged.insert(key.clone(), value.clone());
    }

    let mut rendered = sql.to_string();
    for (key, value) in &merged {
        rendered = rendered.replace(&format!("${{{key}}}"), value);
    }
    rendered
}

/// Names of `${...}` tokens still present in rendered text. The runner treats
/// a non-empty result as a validation failure before anything is submitted.
pub fn unresolved_placeholders(sql: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = sql;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !name.is_empty() && !names.iter().any(|seen| seen == name) {
            names.push(name.to_string());
        }
        rest = &after[end + 1..];
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("MART_DATASET".to_string(), "mart_github".to_string()),
            ("MAX_REPO_ALERTS".to_string(), "50".to_string()),
        ])
    }

    #[test]
    fn token_free_text_is_unchanged() {
        let sql = "SELECT 1 FROM mart_github.alerts_daily";
        assert_eq!(render_sql(sql, &base(), &BTreeMap::new()), sql);
    }

    #[test]
    fn substitutes_every_occurrence() {
        let sql = "DELETE FROM ${MART_DATASET}.alerts_daily; DELETE FROM ${MART_DATASET}.daily_summary;";
        let rendered = render_sql(sql, &base(), &BTreeMap::new());
        assert!(!rendered.contains("${MART_DATASET}"));
        assert_eq!(rendered.matches("mart_github").count(), 2);
    }

    #[test]
    fn extra_wins_over_base() {
        let extra = BTreeMap::from([("MAX_REPO_ALERTS".to_string(), "2".to_string())]);
        let rendered = render_sql("LIMIT ${MAX_REPO_ALERTS}", &base(), &extra);
        assert_eq!(rendered, "LIMIT 2");
    }

    #[test]
    fn unknown_placeholders_pass_through() {
        let rendered = render_sql("SELECT ${MYSTERY}", &base(), &BTreeMap::new());
        assert_eq!(rendered, "SELECT ${MYSTERY}");
    }

    #[test]
    fn finds_leftover_tokens() {
        let sql = "SELECT ${A}, ${B}, ${A} FROM t";
        assert_eq!(unresolved_placeholders(sql), vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn clean_text_has_no_leftovers() {
        assert!(unresolved_placeholders("SELECT 1").is_empty());
    }
}
