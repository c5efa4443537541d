use colored::Colorize;

use crate::api::types::FilterOptions;
use crate::chat::message::{Message, Role, Source};
use crate::chat::state::HealthIndicator;
use crate::chat::QueryMode;

use super::commands::HELP;

const SNIPPET_CHARS: usize = 240;

/// Renders message `number` (1-based) with its sources when `expanded`.
pub fn message(number: usize, message: &Message, expanded: bool) -> String {
    let mut out = String::new();
    let time = message.timestamp.format("%H:%M");
    let tag = match message.role {
        Role::User => "you".green().bold(),
        Role::Assistant => "assistant".cyan().bold(),
    };
    out.push_str(&format!(
        "{} {} {}\n",
        format!("[{}]", number).dimmed(),
        tag,
        time.to_string().dimmed()
    ));
    out.push_str(message.content.trim_end());
    out.push('\n');

    if let Some(web) = &message.web_search_response {
        out.push_str(&format!(
            "\n{} {}\n",
            "web".magenta().bold(),
            format!("({} sources fetched)", web.sources_fetched).dimmed()
        ));
        out.push_str(web.enriched_response.trim_end());
        out.push('\n');
        if !web.synthesized_keywords.is_empty() {
            out.push_str(&format!(
                "{} {}\n",
                "keywords:".dimmed(),
                web.synthesized_keywords.join(", ")
            ));
        }
        for hit in &web.web_search_results {
            out.push_str(&format!("  {}. {} {}\n", hit.position, hit.title, hit.link.dimmed()));
        }
    }

    let sources = message.sources.as_deref().unwrap_or_default();
    if !sources.is_empty() {
        if expanded {
            out.push_str(&format!("{}\n", "sources:".dimmed()));
            for (index, source) in sources.iter().enumerate() {
                out.push_str(&self::source(index + 1, source));
            }
        } else {
            out.push_str(&format!(
                "{}\n",
                format!("{} sources, /sources {} to show", sources.len(), number).dimmed()
            ));
        }
    }

    if message.is_web_search_loading {
        out.push_str(&format!("{}\n", "searching the web...".yellow()));
    } else if let Some(error) = &message.web_search_error {
        out.push_str(&format!("{}\n", error.red()));
    }
    if message.can_request_web_search() {
        out.push_str(&format!(
            "{}\n",
            format!("/web {} to enrich this answer from the web", number).yellow()
        ));
    }

    out
}

pub fn source(number: usize, source: &Source) -> String {
    let mut header = format!("  {}.", number);
    if source.is_web() {
        header.push_str(&format!(" {}", "[web]".magenta()));
    }
    if let Some(title) = source.title() {
        header.push_str(&format!(" {}", title.bold()));
    }
    if let Some(score) = source.score {
        header.push_str(&format!(" {}", format!("({:.2})", score).dimmed()));
    }

    let mut out = format!("{}\n    {}\n", header, snippet(&source.text));
    for link in source.web_links() {
        out.push_str(&format!("    {}\n", link.dimmed()));
    }
    out
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
    format!("{}...", cut.trim_end())
}

pub fn error_banner(text: &str) -> String {
    format!("{} {}", "error:".red().bold(), text)
}

pub fn notice(text: &str) -> String {
    format!("{}", text.dimmed())
}

pub fn health(indicator: &HealthIndicator) -> String {
    let summary = indicator.summary();
    match indicator {
        HealthIndicator::Connected(_) => format!("{} {}", "●".green(), summary),
        HealthIndicator::Unreachable(_) => format!("{} {}", "●".red(), summary),
        HealthIndicator::Unknown => format!("{} {}", "●".dimmed(), summary),
    }
}

pub fn modes(current: QueryMode) -> String {
    QueryMode::ALL
        .iter()
        .map(|mode| {
            let marker = if *mode == current { "*" } else { " " };
            format!("{} {:<9} {}", marker, mode.as_str().bold(), mode.label())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn filters(options: &FilterOptions) -> String {
    let mut out = String::new();
    let facets = [
        ("categories", &options.categories),
        ("platforms", &options.platforms),
        ("tags", &options.tags),
        ("source types", &options.source_types),
    ];
    for (name, values) in facets {
        let list = if values.is_empty() {
            "-".dimmed().to_string()
        } else {
            values.join(", ")
        };
        out.push_str(&format!("{:<13} {}\n", format!("{}:", name).bold(), list));
    }
    for (name, value) in &options.extra {
        out.push_str(&format!("{:<13} {}\n", format!("{}:", name).bold(), value));
    }
    out
}

pub fn help() -> String {
    HELP.iter()
        .map(|(usage, what)| format!("  {:<18} {}", usage.cyan(), what))
        .collect::<Vec<_>>()
        .join("\n")
}
