//! Bounded capture of child process output

use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes read from one stream, cut at the capture cap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub bytes: Vec<u8>,
    /// The stream produced more than the cap
    pub truncated: bool,
}

/// Read a stream to EOF keeping at most `cap` bytes.
///
/// Reading continues past the cap so the child never blocks on a full pipe;
/// the excess is discarded and recorded as truncation.
pub async fn read_capped<R>(mut reader: R, cap: usize) -> std::io::Result<CapturedOutput>
where
    R: AsyncRead + Unpin,
{
    let mut output = CapturedOutput::default();
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = cap.saturating_sub(output.bytes.len());
        if n > room {
            output.truncated = true;
        }
        output.bytes.extend_from_slice(&chunk[..n.min(room)]);
    }

    Ok(output)
}

/// Lossy UTF-8 rendering limited to `max_chars` characters
pub fn to_text(bytes: &[u8], max_chars: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.chars().count() <= max_chars {
        return text.into_owned();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("\n... (truncated)");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_everything_under_cap() {
        let reader = tokio_test::io::Builder::new()
            .read(b"hello ")
            .read(b"world")
            .build();
        let output = read_capped(reader, 64).await.unwrap();
        assert_eq!(output.bytes, b"hello world");
        assert!(!output.truncated);
    }

    #[tokio::test]
    async fn test_truncates_and_drains_past_cap() {
        let reader = tokio_test::io::Builder::new()
            .read(b"0123456789")
            .read(b"abcdef")
            .build();
        let output = read_capped(reader, 4).await.unwrap();
        assert_eq!(output.bytes, b"0123");
        assert!(output.truncated);
    }

    #[tokio::test]
    async fn test_exact_cap_is_not_truncation() {
        let output = read_capped(&b"abcd"[..], 4).await.unwrap();
        assert_eq!(output.bytes, b"abcd");
        assert!(!output.truncated);
    }

    #[test]
    fn test_to_text() {
        assert_eq!(to_text(b"short", 10), "short");
        assert_eq!(to_text("ééé".as_bytes(), 2), "éé\n... (truncated)");
        assert_eq!(to_text(&[0x66, 0xff], 10), "f\u{fffd}");
    }
}
