//! Output filename templating
//!
//! The final file name comes from a template with `{placeholder}` fields
//! substituted from video metadata. Expansion is pure and deterministic:
//! the same template and metadata always produce the same name.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::types::VideoMetadata;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Unwrap is fine for a pattern fixed at compile time
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").unwrap())
}

/// Expand an output filename template.
///
/// Supported placeholders: `{id}`, `{title}`, `{title_slug}`, `{date}`,
/// `{time}`, `{datetime}`, `{channel}`, `{channel_login}`, `{format}`,
/// `{game}`, `{game_slug}`, `{slug}`. An unrecognized placeholder is an
/// error rather than passing through silently, so typos surface before
/// any download work starts.
///
/// Substituted values are stripped of path separators; a title cannot
/// redirect the output into another directory.
pub fn expand_template(template: &str, metadata: &VideoMetadata, format: &str) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in placeholder_re().captures_iter(template) {
        // Both groups always exist when the regex matches
        #[allow(clippy::unwrap_used)]
        let whole = caps.get(0).unwrap();
        #[allow(clippy::unwrap_used)]
        let name = caps.get(1).unwrap().as_str();

        result.push_str(&template[last_end..whole.start()]);
        result.push_str(&sanitize(&lookup(name, metadata, format)?));
        last_end = whole.end();
    }
    result.push_str(&template[last_end..]);

    Ok(result)
}

fn lookup(name: &str, metadata: &VideoMetadata, format: &str) -> Result<String> {
    let value = match name {
        "id" => metadata.id.clone(),
        "title" => metadata.title.clone(),
        "title_slug" => slugify(&metadata.title),
        "channel" => metadata.channel.clone(),
        "channel_login" => metadata.channel_login.clone(),
        "format" => format.to_string(),
        "game" => metadata.game.clone().unwrap_or_default(),
        "game_slug" => slugify(metadata.game.as_deref().unwrap_or_default()),
        "slug" => metadata.clip_slug.clone().unwrap_or_default(),
        "date" => match metadata.recorded_at {
            Some(at) => at.format("%Y-%m-%d").to_string(),
            None => "unknown".to_string(),
        },
        "time" => match metadata.recorded_at {
            Some(at) => at.format("%H-%M-%S").to_string(),
            None => "unknown".to_string(),
        },
        "datetime" => match metadata.recorded_at {
            Some(at) => at.format("%Y-%m-%d_%H-%M-%S").to_string(),
            None => "unknown".to_string(),
        },
        _ => {
            return Err(Error::UnknownPlaceholder {
                name: name.to_string(),
            });
        }
    };
    Ok(value)
}

/// Lowercase alphanumeric runs joined by single underscores.
fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_sep = false;

    for ch in value.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            for lower in ch.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_sep = true;
        }
    }
    slug
}

/// Drop path separators so metadata values cannot escape the output dir.
fn sanitize(value: &str) -> String {
    value.replace(['/', '\\'], "_")
}
