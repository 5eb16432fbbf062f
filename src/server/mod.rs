//! JSON-lines answer server
//!
//! Reads one request object per line and writes one reply object per line.
//! Requests are answered in arrival order; a failed request produces an
//! error reply and the loop keeps going.


use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::RagError;
use crate::answer::{AnswerComposer, AnswerRequest, AnswerResponse};

/// Error reply carrying the stable error category and its HTTP-equivalent status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorReply {
    pub error: String,
    pub kind: String,
    pub status: u16,
}

impl From<&RagError> for ErrorReply {
    #[inline]
    fn from(error: &RagError) -> Self {
        Self {
            error: error.to_string(),
            kind: error.kind().to_string(),
            status: error.status_code(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Reply {
    Answer(AnswerResponse),
    Error(ErrorReply),
}

pub struct AnswerServer {
    composer: Arc<AnswerComposer>,
}

impl AnswerServer {
    #[inline]
    pub fn new(composer: Arc<AnswerComposer>) -> Self {
        Self { composer }
    }

    /// Start the server using stdio transport
    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("Starting answer server with stdio transport");

        let reader = BufReader::new(io::stdin());
        let mut stdout = io::stdout();
        let served = self.serve(reader, &mut stdout).await?;

        info!("Answer server stopped after {} requests", served);
        Ok(())
    }

    /// Answer every line from `reader` until EOF, returning the number of replies written
    pub async fn serve<R, W>(&self, mut reader: R, writer: &mut W) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut served = 0;
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer).await {
                Ok(0) => {
                    debug!("EOF reached, closing connection");
                    break;
                }
                Ok(_) => {
                    let reply = match std::str::from_utf8(&buffer) {
                        Ok(line) => {
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            self.handle_line(line).await
                        }
                        Err(e) => {
                            warn!("Request line is not valid UTF-8: {}", e);
                            Reply::Error(ErrorReply::from(&RagError::InvalidInput(format!(
                                "request is not valid UTF-8: {e}"
                            ))))
                        }
                    };

                    send_reply(writer, &reply).await?;
                    served += 1;
                }
                Err(e) => {
                    error!("Error reading request stream: {}", e);
                    break;
                }
            }
        }

        Ok(served)
    }

    /// Parse and answer one request line
    #[inline]
    pub async fn handle_line(&self, line: &str) -> Reply {
        let request: AnswerRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                return Reply::Error(ErrorReply::from(&RagError::InvalidInput(format!(
                    "request is not a valid JSON object: {e}"
                ))));
            }
        };

        match self.composer.answer_query(&request).await {
            Ok(response) => Reply::Answer(response),
            Err(e) => {
                if e.is_client_error() {
                    warn!("Rejected request: {}", e);
                } else {
                    error!("Request failed: {}", e);
                }
                Reply::Error(ErrorReply::from(&e))
            }
        }
    }
}

async fn send_reply<W>(writer: &mut W, reply: &Reply) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(reply)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
