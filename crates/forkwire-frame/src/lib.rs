//! Length-prefixed value framing for forkwire.
//!
//! Every message on a forkwire connection is one frame:
//! - A 4-byte big-endian payload length
//! - The JSON encoding of a single [`Value`]
//!
//! A frame carrying `null` is the goodbye sentinel. Callers always see whole
//! values; partial reads and buffering stay inside this crate.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

use forkwire_transport::IpcStream;

#[cfg(feature = "async")]
pub use async_codec::ValueCodec;
pub use codec::{
    decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAX_WIRE_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use message::{decode_value, encode_value, is_goodbye, Value, GOODBYE};
pub use reader::FrameReader;
pub use writer::FrameWriter;

/// Split a connected stream into a reader half and a writer half.
///
/// Both halves share the same connection, so they can be driven from
/// separate threads.
pub fn split_stream(
    stream: IpcStream,
    config: FrameConfig,
) -> Result<(FrameReader<IpcStream>, FrameWriter<IpcStream>)> {
    let read_half = stream
        .try_clone()
        .map_err(|err| FrameError::Io(err.into()))?;
    Ok((
        FrameReader::with_config(read_half, config.clone()),
        FrameWriter::with_config(stream, config),
    ))
}

#[cfg(test)]
mod tests {
    use std::thread;

    use forkwire_transport::LoopbackListener;
    use serde_json::json;

    use super::*;

    #[test]
    fn split_halves_carry_values_both_ways() {
        let listener = LoopbackListener::bind().unwrap();
        let port = listener.port();

        let peer = thread::spawn(move || {
            let stream = listener.accept().unwrap();
            let (mut reader, mut writer) = split_stream(stream, FrameConfig::default()).unwrap();
            let got = reader.read_value().unwrap();
            writer.send_value(&json!({ "echo": got })).unwrap();
        });

        let stream = LoopbackListener::connect(port).unwrap();
        let (mut reader, mut writer) = split_stream(stream, FrameConfig::default()).unwrap();
        writer.send_value(&json!([1, "two"])).unwrap();

        assert_eq!(reader.read_value().unwrap(), json!({ "echo": [1, "two"] }));
        peer.join().unwrap();
    }
}
