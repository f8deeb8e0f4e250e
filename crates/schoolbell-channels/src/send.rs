use schoolbell_core::{ChannelId, TenantId};

use crate::manager::ChannelManager;
use crate::types::{MessageFormat, OutboundMessage};

/// Split `text` into chunks of at most `max` characters.
///
/// Lines are kept whole and packed greedily; a single line longer than `max`
/// is cut at character boundaries. Lengths are counted in `char`s, so
/// multi-byte text never splits inside a code point.
pub fn split_chunks(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let needed = if current.is_empty() { line_len } else { current_len + 1 + line_len };
        if needed <= max {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            current_len = needed;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if line_len <= max {
            current.push_str(line);
            current_len = line_len;
        } else {
            let mut pieces = hard_split(line, max);
            // The tail may still share a chunk with following lines.
            let tail = pieces.pop().unwrap_or_default();
            chunks.extend(pieces);
            current_len = tail.chars().count();
            current = tail;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn hard_split(line: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}

/// Send `text` to one channel in chunks of at most `max` characters.
pub async fn send_chunked(
    manager: &ChannelManager,
    tenant: TenantId,
    channel: ChannelId,
    text: &str,
    max: usize,
) {
    for chunk in split_chunks(text, max) {
        let msg = OutboundMessage {
            tenant,
            channel,
            content: chunk,
            format: MessageFormat::Markdown,
        };
        manager.send(&msg).await;
    }
}
