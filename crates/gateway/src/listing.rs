//! Boxed, chunked listings for `/listprem`, `/listresell` and `/listuser`.
//!
//! Each chunk opens with a `Part N` header and closes with a footer.  An
//! entry is appended only while the chunk plus the entry plus the reserved
//! margin stays under the transport's message limit; otherwise the chunk
//! is closed and the entry starts the next one.  Lengths are UTF-16 units.

use pb_domain::config::ListingConfig;
use pb_domain::error::Result;
use pb_domain::{AdminId, ChatId, PhoneNumber};

use crate::transport::{AdminTransport, OutgoingMessage};

pub const FOOTER: &str = "└────────────────────────┘";

pub fn header(title: &str, part: usize) -> String {
    format!("┌──────┤ {title} (Part {part}) ├──────┐\n")
}

pub fn entry(id: AdminId, username: &str, number: Option<&PhoneNumber>) -> String {
    match number {
        Some(n) => format!("│➻ ID: {id}\n│➻ Username: {username}\n│➻ Number: {n}\n│\n"),
        None => format!("│➻ ID: {id}\n│➻ Username: {username}\n│\n"),
    }
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Split `entries` into footer-closed chunks.  No entries, no chunks.
pub fn paginate(title: &str, entries: &[String], config: &ListingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut part = 1;
    let mut current = header(title, part);
    let mut filled = false;

    for e in entries {
        if !filled || utf16_len(&current) + utf16_len(e) + config.chunk_margin < config.message_limit {
            current.push_str(e);
            filled = true;
            continue;
        }
        current.push_str(FOOTER);
        chunks.push(current);
        part += 1;
        current = header(title, part);
        current.push_str(e);
    }

    if filled {
        current.push_str(FOOTER);
        chunks.push(current);
    }
    chunks
}

/// `@username`, `No Username`, or `Error fetching` when the lookup fails.
pub async fn display_name(transport: &dyn AdminTransport, id: AdminId) -> String {
    match transport.username_of(id).await {
        Ok(Some(name)) => format!("@{name}"),
        Ok(None) => "No Username".to_string(),
        Err(e) => {
            tracing::warn!(user_id = %id, error = %e, "display name lookup failed");
            "Error fetching".to_string()
        }
    }
}

/// Send chunks in order with `config.chunk_delay()` after each.
pub async fn send_chunks(
    transport: &dyn AdminTransport,
    chat: ChatId,
    chunks: Vec<String>,
    config: &ListingConfig,
) -> Result<()> {
    for chunk in chunks {
        transport.send(OutgoingMessage::text(chat, chunk)).await?;
        tokio::time::sleep(config.chunk_delay()).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| entry(AdminId(1_000_000 + i as i64), "@someone", None))
            .collect()
    }

    #[test]
    fn empty_yields_nothing() {
        assert!(paginate("Reseller List", &[], &ListingConfig::default()).is_empty());
    }

    #[test]
    fn single_chunk_shape() {
        let chunks = paginate("Reseller List", &entries(1), &ListingConfig::default());
        assert_eq!(
            chunks,
            vec![format!(
                "┌──────┤ Reseller List (Part 1) ├──────┐\n│➻ ID: 1000000\n│➻ Username: @someone\n│\n{FOOTER}"
            )]
        );
    }

    #[test]
    fn every_chunk_fits_the_limit() {
        let config = ListingConfig::default();
        let all = entries(400);
        let chunks = paginate("Premium Users List", &all, &config);

        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert!(utf16_len(c) <= config.message_limit, "chunk {i} too long");
            assert!(c.starts_with(&header("Premium Users List", i + 1)));
            assert!(c.ends_with(FOOTER));
        }
        let total: usize = chunks.iter().map(|c| c.matches("│➻ ID:").count()).sum();
        assert_eq!(total, 400);
    }

    #[test]
    fn margin_forces_a_split() {
        let config = ListingConfig {
            message_limit: 200,
            chunk_margin: 100,
            chunk_delay_ms: 0,
        };
        let chunks = paginate("T", &entries(3), &config);
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn user_entry_includes_number() {
        let n = PhoneNumber::parse("15551234567").unwrap();
        assert_eq!(
            entry(AdminId(2002), "No Username", Some(&n)),
            "│➻ ID: 2002\n│➻ Username: No Username\n│➻ Number: 15551234567\n│\n"
        );
    }

    #[test]
    fn box_drawing_counts_as_single_units() {
        assert_eq!(utf16_len("┌─"), 2);
        assert_eq!(utf16_len("😀"), 2);
    }
}
