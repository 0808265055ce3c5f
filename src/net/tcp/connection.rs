use crate::banner;
use crate::error::{AppResult, DecodeError, HandshakeError, SessionError};
use crate::net::AppCtx;
use crate::net::output::{OutputHandle, SessionIoBundle, init_session_output};
use crate::protocol::{decode_handshake, decode_line};
use crate::router::{Flow, RouteCtx, route};
use crate::state::registry::Registration;
use crate::state::session::{Session, SessionState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader};

/// How long a closing session may spend flushing queued output
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub const DUPLICATE_NAME_NOTICE: &str = "Username has already been taken!";

enum ReadLine {
    Line(String),
    TooLong,
    Eof,
}

/// Reads one '\n'-terminated line of at most `max` bytes (terminator excluded).
async fn read_line<R>(reader: &mut R, max: usize) -> std::io::Result<ReadLine>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader).take(max as u64 + 1).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(ReadLine::Eof);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > max {
        return Ok(ReadLine::TooLong);
    }

    Ok(ReadLine::Line(String::from_utf8_lossy(&buf).into_owned()))
}

/// Drives one connection from accept to close: handshake, read loop, cleanup.
pub async fn handle_connection<R, W>(
    reader: R,
    writer: W,
    peer: Option<SocketAddr>,
    app: Arc<AppCtx>,
) -> AppResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut sess = Session::new(peer);
    let mut reader = BufReader::new(reader);
    let io = init_session_output(writer, app.config.outbound_capacity, app.config.line_ending);

    sess.advance(SessionState::Handshaking)?;

    let registration = match handshake(&mut reader, &io.output, &app).await {
        Ok((registration, name)) => {
            sess.activate(registration.id, name)?;
            registration
        }
        Err(e) => {
            sess.begin_close();
            close_output(io).await;
            sess.finish_close();
            return Err(e.into());
        }
    };

    let name = sess.name().unwrap_or_default().to_string();
    tracing::info!(session_id = %registration.id, %name, "just connected");
    io.output.notice(banner::welcome(&name)).await;

    let result = read_loop(&mut reader, &io.output, &registration, &name, &app).await;

    sess.begin_close();
    app.registry.unregister(registration.id);
    close_output(io).await;
    sess.finish_close();

    if let Err(e) = &result {
        tracing::info!(session_id = %registration.id, %name, error = %e, "forced logout");
    }
    result
}

async fn handshake<R>(
    reader: &mut R,
    output: &OutputHandle,
    app: &AppCtx,
) -> Result<(Registration, String), HandshakeError>
where
    R: AsyncBufRead + Unpin,
{
    let line = match read_line(reader, app.config.max_line_len).await? {
        ReadLine::Line(line) => line,
        ReadLine::TooLong => {
            let e = HandshakeError::InvalidName("name line too long".into());
            output.notice(format!("Rejected: {e}")).await;
            return Err(e);
        }
        ReadLine::Eof => return Err(HandshakeError::Disconnected),
    };

    let name = match decode_handshake(&line) {
        Ok(name) => name,
        Err(e) => {
            output.notice(format!("Rejected: {e}")).await;
            return Err(e);
        }
    };

    match app.registry.register(&name, output.clone()) {
        Ok(registration) => Ok((registration, name)),
        Err(_) => {
            output.notice(DUPLICATE_NAME_NOTICE).await;
            Err(HandshakeError::DuplicateName(name))
        }
    }
}

async fn read_loop<R>(
    reader: &mut R,
    output: &OutputHandle,
    registration: &Registration,
    name: &str,
    app: &AppCtx,
) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let ctx = RouteCtx {
        registry: app.registry.clone(),
        filter: app.filter.clone(),
        clock: app.clock.clone(),
        id: registration.id,
        name: name.to_string(),
    };
    let max = app.config.max_line_len;

    loop {
        let read = tokio::select! {
            _ = registration.closed.notified() => {
                tracing::debug!(session_id = %registration.id, "session removed, closing");
                return Ok(());
            }
            read = read_line(reader, max) => read?,
        };

        let line = match read {
            ReadLine::Line(line) => line,
            ReadLine::TooLong => return Err(DecodeError::LineTooLong { max }.into()),
            ReadLine::Eof => return Err(SessionError::ConnectionLost(std::io::ErrorKind::UnexpectedEof.into())),
        };

        if line.trim().is_empty() {
            continue;
        }

        match decode_line(&line, name) {
            Ok(envelope) => {
                if route(envelope, &ctx) == Flow::Stop {
                    return Ok(());
                }
            }
            Err(DecodeError::Usage(usage)) => output.notice(format!("usage: {usage}")).await,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Drops the last local handle so the writer drains and shuts the socket down.
async fn close_output(io: SessionIoBundle) {
    let SessionIoBundle { output, mut writer } = io;
    drop(output);

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        tracing::debug!("writer did not drain in time, aborting");
        writer.abort();
    }
}
