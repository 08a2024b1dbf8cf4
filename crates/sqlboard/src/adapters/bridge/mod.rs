mod handler;
mod io;
mod protocol;

use std::{
    io::{BufRead, Write},
    sync::Arc,
};

use tokio::sync::mpsc;

use crate::{
    cli::Args,
    error::{AppError, AppResult},
};

pub use handler::BridgeHandler;
pub use io::{JsonLineWriter, LineReader, NdjsonIo};
pub use protocol::{BridgeRequest, BridgeResponse, PROTOCOL_VERSION};

pub fn run(args: Args) -> AppResult<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let handler = Arc::new(BridgeHandler::new(&args));
    let served = rt.block_on(serve(NdjsonIo::stdio(), handler));
    // A reader still parked on stdin must not hold up exit.
    rt.shutdown_background();
    served.map(|_| ())
}

/// Answers one response line per request line until the input ends, then
/// hands back the output once every in-flight request has been answered.
///
/// Each request runs as its own task, so a slow query never holds up other
/// requests. Responses are written in completion order; callers match them
/// by `id`.
pub async fn serve<R, W>(io: NdjsonIo<R, W>, handler: Arc<BridgeHandler>) -> AppResult<W>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    let (mut reader, mut writer) = io.split();
    let (line_tx, mut lines) = mpsc::unbounded_channel::<String>();
    let (resp_tx, mut responses) = mpsc::unbounded_channel::<BridgeResponse>();

    let read_task = tokio::task::spawn_blocking(move || -> AppResult<()> {
        while let Some(line) = reader.read_line()? {
            if line_tx.send(line).is_err() {
                break;
            }
        }
        Ok(())
    });

    // Single writer: lines from concurrent requests never interleave.
    let write_task = tokio::task::spawn_blocking(move || -> AppResult<JsonLineWriter<W>> {
        while let Some(resp) = responses.blocking_recv() {
            writer.write_json_line(&resp)?;
        }
        Ok(writer)
    });

    loop {
        let line = tokio::select! {
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
            // writer failed; its error is returned below
            _ = resp_tx.closed() => break,
        };
        if line.is_empty() {
            continue;
        }

        let req: BridgeRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request line");
                if resp_tx.send(BridgeResponse::protocol_error(e.to_string())).is_err() {
                    break;
                }
                continue;
            }
        };

        let handler = Arc::clone(&handler);
        let tx = resp_tx.clone();
        tokio::spawn(async move {
            let id = req.id.clone();
            if tx.send(handler.handle(req).await).is_err() {
                tracing::debug!(%id, "writer closed; response dropped");
            }
        });
    }
    drop(resp_tx);

    let writer = write_task
        .await
        .map_err(|e| AppError::Internal(format!("bridge writer task failed: {e}")))??;
    read_task
        .await
        .map_err(|e| AppError::Internal(format!("bridge reader task failed: {e}")))??;
    writer.into_output()
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, time::Duration};

    use super::*;
    use crate::core::{connection::DatabaseStore, limits::MAX_PAGE_SIZE};

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
    }

    fn handler() -> Arc<BridgeHandler> {
        let dir = std::env::temp_dir().join("sqlboard-no-such-dir");
        Arc::new(BridgeHandler::with_store(DatabaseStore::new(dir, Duration::from_millis(10)), MAX_PAGE_SIZE))
    }

    #[tokio::test]
    async fn output_failure_on_protocol_error_is_returned() {
        let io = NdjsonIo::new(Cursor::new("not json\n{\"v\":1}\n"), ClosedPipe);
        let err = serve(io, handler()).await.err();
        assert!(matches!(err, Some(AppError::Io(_))), "{err:?}");
    }

    #[tokio::test]
    async fn every_request_gets_one_line() {
        let input = "{\"v\":1,\"id\":\"a\",\"cmd\":\"validate_query\",\"payload\":{\"query\":\"SELECT 1\"}}\n\
                     \n\
                     {\"v\":1,\"id\":\"b\",\"cmd\":\"schema\",\"payload\":{\"filename\":\"gone.db\"}}\n";
        let out = serve(NdjsonIo::new(Cursor::new(input), Vec::new()), handler()).await.unwrap();
        let mut ids: Vec<String> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["id"].as_str().unwrap().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
