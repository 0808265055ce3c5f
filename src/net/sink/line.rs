use crate::config::LineEnding;
use crate::net::output::OutFrame;
use crate::net::sink::ClientSink;
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Plain text sink for line-oriented TCP (and telnet) clients.
pub struct LineSink<W> {
    writer: W,
    line_ending: LineEnding,
    // Scratch buffer for line-ending expansion
    buf: Vec<u8>,
}

impl<W> LineSink<W> {
    pub fn new(writer: W, line_ending: LineEnding) -> Self {
        Self { writer, line_ending, buf: Vec::new() }
    }
}

/// Appends `src` to `dst`, turning bare '\n' into "\r\n" when asked to.
fn expand_line_endings(dst: &mut Vec<u8>, src: &[u8], line_ending: LineEnding) {
    if line_ending == LineEnding::Lf {
        dst.extend_from_slice(src);
        return;
    }

    dst.reserve(src.len());
    let mut prev = 0u8;
    for &b in src {
        if b == b'\n' && prev != b'\r' {
            dst.push(b'\r');
        }
        dst.push(b);
        prev = b;
    }
}

#[async_trait]
impl<W> ClientSink for LineSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send_frame(&mut self, frame: OutFrame, _seq: u64) -> anyhow::Result<()> {
        self.buf.clear();
        match frame {
            OutFrame::Line(s) => {
                expand_line_endings(&mut self.buf, s.as_bytes(), self.line_ending);
            }
            OutFrame::Notice(s) => {
                expand_line_endings(&mut self.buf, s.as_bytes(), self.line_ending);
                if !s.ends_with('\n') {
                    expand_line_endings(&mut self.buf, b"\n", self.line_ending);
                }
            }
        }

        self.writer.write_all(&self.buf).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(s: &str, le: LineEnding) -> String {
        let mut out = Vec::new();
        expand_line_endings(&mut out, s.as_bytes(), le);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn crlf_expansion() {
        assert_eq!(expand("a\nb\n", LineEnding::CrLf), "a\r\nb\r\n");
        assert_eq!(expand("a\r\nb", LineEnding::CrLf), "a\r\nb");
        assert_eq!(expand("a\nb\n", LineEnding::Lf), "a\nb\n");
    }

    #[tokio::test]
    async fn notice_gets_newline() {
        let mut sink = LineSink::new(Vec::new(), LineEnding::CrLf);
        sink.send_frame(OutFrame::Notice("hello".into()), 1).await.unwrap();
        sink.send_frame(OutFrame::Notice("done\n".into()), 2).await.unwrap();
        sink.send_frame(OutFrame::Line("Active Users: \nbob\n".into()), 3).await.unwrap();
        assert_eq!(sink.writer, b"hello\r\ndone\r\nActive Users: \r\nbob\r\n");
    }
}
