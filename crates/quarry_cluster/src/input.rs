//! Shared command input.
//!
//! The root worker reads command lines from its input source and
//! broadcasts them so every worker processes the identical stream.
//! End of input is observed identically by all workers.

use crate::collective::{Collective, decode, encode};
use quarry_core::CoreResult;
use std::io::BufRead;
use std::sync::Arc;

/// Root-reads-then-broadcast input relay
pub struct InputRelay {
    collective: Arc<dyn Collective>,
}

impl InputRelay {
    /// Create a relay over a collective backend
    #[must_use]
    pub fn new(collective: Arc<dyn Collective>) -> Self {
        Self { collective }
    }

    /// Read the next line on the root and deliver it to every worker
    ///
    /// Returns `None` at end of input, on every worker. Non-root workers
    /// ignore their own `input` argument entirely.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the broadcast fails, or an I/O
    /// failure on the root wrapped as an internal error.
    pub async fn next_line<R: BufRead>(&self, input: &mut R) -> CoreResult<Option<String>> {
        let is_root = self.collective.rank() == 0;

        // The relayed message is Option<String>: None marks end of input.
        let message = if is_root {
            Some(read_one_line(input)?)
        } else {
            None
        };

        if self.collective.size() == 1 {
            return Ok(message.flatten());
        }

        let payload = match message {
            Some(ref msg) => Some(encode(msg)?),
            None => None,
        };
        let bytes = self.collective.broadcast(0, payload).await?;
        decode(&bytes)
    }
}

fn read_one_line<R: BufRead>(input: &mut R) -> CoreResult<Option<String>> {
    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .map_err(|err| quarry_core::CoreError::Internal {
            message: format!("input read failed: {}", err),
        })?;
    if read == 0 {
        return Ok(None);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collective::{InProcessFabric, LocalCollective};
    use std::io::Cursor;

    #[tokio::test]
    async fn test_single_node_reads_locally() {
        let relay = InputRelay::new(Arc::new(LocalCollective::new()));
        let mut input = Cursor::new(b"go depth 10\nstop\n".to_vec());

        assert_eq!(
            relay.next_line(&mut input).await.unwrap(),
            Some("go depth 10".to_string())
        );
        assert_eq!(
            relay.next_line(&mut input).await.unwrap(),
            Some("stop".to_string())
        );
        assert_eq!(relay.next_line(&mut input).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_all_workers_see_root_stream() {
        let fabric = InProcessFabric::new(3).unwrap();
        let mut handles = Vec::new();
        for rank in 0..3 {
            let endpoint = fabric.endpoint(rank).unwrap();
            handles.push(tokio::spawn(async move {
                let relay = InputRelay::new(Arc::new(endpoint));
                // Only the root's source carries commands.
                let source = if rank == 0 { "search\nquit\n" } else { "" };
                let mut input = Cursor::new(source.as_bytes().to_vec());

                let first = relay.next_line(&mut input).await.unwrap();
                let second = relay.next_line(&mut input).await.unwrap();
                let third = relay.next_line(&mut input).await.unwrap();
                (first, second, third)
            }));
        }

        for handle in handles {
            let (first, second, third) = handle.await.unwrap();
            assert_eq!(first, Some("search".to_string()));
            assert_eq!(second, Some("quit".to_string()));
            assert_eq!(third, None);
        }
    }

    #[tokio::test]
    async fn test_crlf_is_trimmed() {
        let relay = InputRelay::new(Arc::new(LocalCollective::new()));
        let mut input = Cursor::new(b"stop\r\n".to_vec());
        assert_eq!(
            relay.next_line(&mut input).await.unwrap(),
            Some("stop".to_string())
        );
    }
}
