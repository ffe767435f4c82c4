//! Incremental consumption of the generated risk narrative.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::error::{PosError, Result};

pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Token(String),
    KeepAlive,
    /// Upstream finished; carries the accumulated length in characters.
    Done { chars: usize },
    Error(String),
}

impl StreamEvent {
    /// Server-sent-event framing, terminated by the blank line.
    pub fn to_sse(&self) -> String {
        match self {
            StreamEvent::Token(text) => data_lines(None, text),
            StreamEvent::KeepAlive => ": keep-alive\n\n".to_string(),
            StreamEvent::Done { chars } => data_lines(Some("done"), &chars.to_string()),
            StreamEvent::Error(message) => data_lines(Some("error"), message),
        }
    }
}

fn data_lines(event: Option<&str>, payload: &str) -> String {
    let mut out = String::new();
    if let Some(event) = event {
        out.push_str("event: ");
        out.push_str(event);
        out.push('\n');
    }
    // An empty payload still needs one data line to dispatch.
    for line in payload.split('\n') {
        out.push_str("data: ");
        out.push_str(line.strip_suffix('\r').unwrap_or(line));
        out.push('\n');
    }
    out.push('\n');
    out
}

/// Accumulates tokens until the sender hangs up, forwarding each one to `sink`.
///
/// While the channel stays idle for `keep_alive` the sink receives
/// [`StreamEvent::KeepAlive`]. An upstream error is forwarded as
/// [`StreamEvent::Error`] and aborts with [`PosError::Stream`]; an error
/// returned by the sink aborts as is.
pub fn consume_token_stream<F>(
    rx: &Receiver<Result<String>>,
    keep_alive: Duration,
    mut sink: F,
) -> Result<String>
where
    F: FnMut(StreamEvent) -> Result<()>,
{
    if keep_alive.is_zero() {
        return Err(PosError::InvalidConfiguration(
            "keep-alive interval must be positive".to_string(),
        ));
    }
    let mut text = String::new();
    let mut tokens = 0usize;
    let mut idle_ticks = 0usize;
    loop {
        match rx.recv_timeout(keep_alive) {
            Ok(Ok(token)) => {
                tokens += 1;
                idle_ticks = 0;
                if token.is_empty() {
                    continue;
                }
                text.push_str(&token);
                sink(StreamEvent::Token(token))?;
            }
            Ok(Err(err)) => {
                let message = err.to_string();
                log::warn!("narrative stream aborted after {} tokens: {}", tokens, message);
                sink(StreamEvent::Error(message.clone()))?;
                return Err(PosError::Stream(message));
            }
            Err(RecvTimeoutError::Timeout) => {
                idle_ticks += 1;
                log::debug!("narrative stream idle ({} keep-alives)", idle_ticks);
                sink(StreamEvent::KeepAlive)?;
            }
            Err(RecvTimeoutError::Disconnected) => {
                sink(StreamEvent::Done {
                    chars: text.chars().count(),
                })?;
                return Ok(text);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn tokens_are_forwarded_and_accumulated() {
        let (tx, rx) = unbounded();
        for token in ["## Rischi", "\n", "Caduta ", "dall'alto"] {
            tx.send(Ok(token.to_string())).expect("send");
        }
        drop(tx);
        let mut events = Vec::new();
        let text = consume_token_stream(&rx, Duration::from_secs(5), |event| {
            events.push(event);
            Ok(())
        })
        .expect("stream");
        assert_eq!(text, "## Rischi\nCaduta dall'alto");
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], StreamEvent::Token("## Rischi".to_string()));
        assert_eq!(events[4], StreamEvent::Done { chars: 26 });
    }

    #[test]
    fn idle_channel_emits_keep_alive() {
        let (tx, rx) = unbounded();
        let producer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(120));
            tx.send(Ok("ponteggio".to_string())).expect("send");
        });
        let mut keep_alives = 0;
        let text = consume_token_stream(&rx, Duration::from_millis(20), |event| {
            if event == StreamEvent::KeepAlive {
                keep_alives += 1;
            }
            Ok(())
        })
        .expect("stream");
        producer.join().expect("producer");
        assert_eq!(text, "ponteggio");
        assert!(keep_alives >= 2, "only {} keep-alives", keep_alives);
    }

    #[test]
    fn upstream_error_aborts() {
        let (tx, rx) = unbounded();
        tx.send(Ok("Inizio".to_string())).expect("send");
        tx.send(Err(PosError::Stream("upstream 503".to_string())))
            .expect("send");
        let mut last = None;
        let err = consume_token_stream(&rx, Duration::from_secs(5), |event| {
            last = Some(event);
            Ok(())
        })
        .expect_err("abort");
        assert!(matches!(err, PosError::Stream(_)));
        assert!(matches!(last, Some(StreamEvent::Error(ref m)) if m.contains("upstream 503")));
    }

    #[test]
    fn sink_failure_stops_consumption() {
        let (tx, rx) = unbounded();
        tx.send(Ok("a".to_string())).expect("send");
        tx.send(Ok("b".to_string())).expect("send");
        let mut seen = 0;
        let err = consume_token_stream(&rx, Duration::from_secs(5), |_| {
            seen += 1;
            Err(PosError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "client gone",
            )))
        })
        .expect_err("client gone");
        assert!(matches!(err, PosError::Io(_)));
        assert_eq!(seen, 1);
    }

    #[test]
    fn sse_framing() {
        assert_eq!(
            StreamEvent::Token("riga 1\nriga 2".to_string()).to_sse(),
            "data: riga 1\ndata: riga 2\n\n"
        );
        assert_eq!(StreamEvent::KeepAlive.to_sse(), ": keep-alive\n\n");
        assert_eq!(
            StreamEvent::Done { chars: 42 }.to_sse(),
            "event: done\ndata: 42\n\n"
        );
        assert_eq!(
            StreamEvent::Error(String::new()).to_sse(),
            "event: error\ndata: \n\n"
        );
    }

    #[test]
    fn zero_keep_alive_is_rejected() {
        let (_tx, rx) = unbounded::<Result<String>>();
        let err = consume_token_stream(&rx, Duration::ZERO, |_| Ok(())).expect_err("zero");
        assert!(matches!(err, PosError::InvalidConfiguration(_)));
    }
}
