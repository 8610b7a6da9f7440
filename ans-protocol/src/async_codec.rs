//! [`tokio_util::codec`] implementations of the command channel framing.
//!
//! [`ClientCodec`] sends [`CmdFrame`]s and receives [`CmdRspFrame`]s, [`ServerCodec`] does the
//! opposite. The link handshake is not part of the codec and has to be done on the raw
//! stream before it is wrapped into a `Framed`.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    error::AnsError,
    frame::{CmdFrame, CmdRspFrame, Header},
    protocol::DEFAULT_MAX_FRAME_SIZE,
};

/// Splits the next complete frame off `src`, leaving partial frames in place.
fn next_frame(src: &mut BytesMut, max_size: usize) -> Result<Option<BytesMut>, AnsError> {
    let Some(head) = src.first_chunk::<{ Header::SIZE }>() else {
        return Ok(None);
    };
    let header = Header::from_bytes(head);
    header.check_size(max_size)?;
    let frame_size = header.frame_size()?;
    if src.len() < frame_size {
        src.reserve(frame_size - src.len());
        return Ok(None);
    }
    Ok(Some(src.split_to(frame_size)))
}

#[derive(Copy, Clone, Debug)]
pub struct ClientCodec {
    max_frame_size: usize,
}

impl ClientCodec {
    pub fn new(max_frame_size: usize) -> ClientCodec {
        ClientCodec { max_frame_size }
    }
}

impl Default for ClientCodec {
    fn default() -> Self {
        ClientCodec::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Encoder<CmdFrame> for ClientCodec {
    type Error = AnsError;

    fn encode(&mut self, item: CmdFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.header.ans.frame_size()?);
        item.write_to(&mut dst.writer())?;
        Ok(())
    }
}

impl Decoder for ClientCodec {
    type Item = CmdRspFrame;
    type Error = AnsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match next_frame(src, self.max_frame_size)? {
            Some(frame) => CmdRspFrame::from_frame_bytes(&frame).map(Some),
            None => Ok(None),
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct ServerCodec {
    max_frame_size: usize,
}

impl ServerCodec {
    pub fn new(max_frame_size: usize) -> ServerCodec {
        ServerCodec { max_frame_size }
    }
}

impl Default for ServerCodec {
    fn default() -> Self {
        ServerCodec::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Encoder<CmdRspFrame> for ServerCodec {
    type Error = AnsError;

    fn encode(&mut self, item: CmdRspFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.header.ans.frame_size()?);
        item.write_to(&mut dst.writer())?;
        Ok(())
    }
}

impl Decoder for ServerCodec {
    type Item = CmdFrame;
    type Error = AnsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match next_frame(src, self.max_frame_size)? {
            Some(frame) => CmdFrame::from_frame_bytes(&frame).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::admin_id;

    #[test]
    fn partial_frames_are_buffered() {
        let mut frame = CmdFrame::admin(admin_id::GET_SERVER_INFO, vec![1, 2, 3, 4]);
        frame.prepare(5, 0);
        let mut encoded = BytesMut::new();
        ClientCodec::default()
            .encode(frame.clone(), &mut encoded)
            .unwrap();

        let mut server = ServerCodec::default();
        let mut src = BytesMut::new();
        src.extend_from_slice(&encoded[..10]);
        assert!(server.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(&encoded[10..30]);
        assert!(server.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(&encoded[30..]);
        assert_eq!(server.decode(&mut src).unwrap(), Some(frame));
        assert!(src.is_empty());
    }

    #[test]
    fn oversized_header_is_rejected() {
        let mut src = BytesMut::new();
        Header::unfragmented(1, 4096, 0)
            .write_to(&mut (&mut src).writer())
            .unwrap();
        match ClientCodec::new(1024).decode(&mut src) {
            Err(AnsError::TooManyBytes { max: 1024, got: 4096 }) => {}
            other => panic!("expected TooManyBytes, got {:?}", other),
        }
    }
}
