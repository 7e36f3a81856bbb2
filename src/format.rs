use crate::resolver::AnnotatedDefinition;

const MS_PER_MINUTE: u64 = 60_000;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;

/// Markdown listing of resolved definitions for terminal output.
pub fn format_results(term: &str, results: &[AnnotatedDefinition], now_ms: u64) -> String {
    let mut output = format!("# {}\n\n", sanitize_heading(term));

    if results.is_empty() {
        output.push_str("No definition found.\n");
        return output;
    }

    for result in results {
        let provenance = if result.cached {
            format!("cached {}", describe_age(now_ms.saturating_sub(result.cache_time)))
        } else {
            "fetched".to_string()
        };
        output.push_str(&format!(
            "## {} ({provenance})\n\n{}\n",
            result.definition.source, result.definition.definition
        ));
        for example in &result.definition.examples {
            output.push_str(&format!("\n> {example}\n"));
        }
        output.push('\n');
    }

    output
}

/// Replace newlines, which would break heading structure, with spaces.
fn sanitize_heading(s: &str) -> String {
    s.chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

fn describe_age(age_ms: u64) -> String {
    match age_ms {
        a if a >= MS_PER_DAY => format!("{}d ago", a / MS_PER_DAY),
        a if a >= MS_PER_HOUR => format!("{}h ago", a / MS_PER_HOUR),
        a if a >= MS_PER_MINUTE => format!("{}m ago", a / MS_PER_MINUTE),
        _ => "just now".to_string(),
    }
}
