//! Sealed-frame pipeline shared by clients and servers.
//!
//! Outbound: form → record bytes → AES-GCM seal → length-prefixed frame.
//! Inbound: socket bytes → frame buffer → open → form.
//!
//! Each inbound frame is opened and parsed before the next length prefix is
//! examined, so every form preceding a corrupt frame has already been handed
//! to the caller when the error surfaces.

use std::future::Future;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::codec::Form;
use crate::error::Result;
use crate::protocol::{build_frame, Frame, FrameBuffer, FrameCipher};

/// Size of each socket read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Seals outgoing forms and opens incoming frames under one shared key.
#[derive(Debug, Clone)]
pub struct SecureTransport {
    cipher: FrameCipher,
    max_frame_size: u32,
}

impl SecureTransport {
    pub fn new(cipher: FrameCipher, max_frame_size: u32) -> Self {
        Self {
            cipher,
            max_frame_size,
        }
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Serialize, seal and frame a form.
    ///
    /// # Errors
    ///
    /// `Crypto` for an unusable key, `FrameLength` if the sealed form would
    /// not fit in one frame.
    pub fn seal_form(&self, form: &Form) -> Result<Bytes> {
        let plaintext = form.serialize();
        let sealed = self.cipher.seal(&plaintext)?;
        build_frame(&sealed, self.max_frame_size)
    }

    /// Authenticate, decrypt and parse one frame.
    pub fn open_frame(&self, frame: &Frame) -> Result<Form> {
        let plaintext = self.cipher.open(frame.payload())?;
        Form::from_bytes(Bytes::from(plaintext))
    }

    /// Create a decoder for one connection's inbound stream.
    pub fn decoder(&self) -> FormDecoder {
        FormDecoder {
            frames: FrameBuffer::with_max_frame_size(self.max_frame_size),
            transport: self.clone(),
        }
    }

    /// Read forms from `reader` until EOF, an error, or cancellation.
    ///
    /// `on_form` is awaited for each form in arrival order. Returns `Ok(())`
    /// on EOF or cancellation. Any framing, crypto or record error ends the
    /// loop, as does an error returned by `on_form`.
    pub async fn read_forms<R, F, Fut>(
        &self,
        mut reader: R,
        shutdown: &CancellationToken,
        mut on_form: F,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        F: FnMut(Form) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut decoder = self.decoder();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let n = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                read = reader.read(&mut chunk) => read?,
            };
            if n == 0 {
                return Ok(());
            }

            decoder.extend(&chunk[..n]);
            while let Some(form) = decoder.next_form()? {
                on_form(form).await?;
            }
        }
    }
}

/// Per-connection inbound state: a frame buffer plus the transport that
/// opens what it yields.
#[derive(Debug)]
pub struct FormDecoder {
    frames: FrameBuffer,
    transport: SecureTransport,
}

impl FormDecoder {
    /// Append bytes read from the socket.
    pub fn extend(&mut self, data: &[u8]) {
        self.frames.extend(data);
    }

    /// Decode the next complete form, if one is buffered.
    pub fn next_form(&mut self) -> Result<Option<Form>> {
        match self.frames.next_frame()? {
            Some(frame) => self.transport.open_frame(&frame).map(Some),
            None => Ok(None),
        }
    }

    /// Append bytes and decode every complete form.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Form>> {
        self.extend(data);
        let mut forms = Vec::new();
        while let Some(form) = self.next_form()? {
            forms.push(form);
        }
        Ok(forms)
    }

    /// Bytes buffered toward the next frame.
    pub fn buffered(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormlinkError;
    use crate::protocol::{encode_length, DEFAULT_MAX_FRAME_SIZE, SEAL_OVERHEAD};
    use tokio::io::{duplex, AsyncWriteExt};

    fn transport(key: u8) -> SecureTransport {
        SecureTransport::new(FrameCipher::new(&[key; 32]), DEFAULT_MAX_FRAME_SIZE)
    }

    fn sample(n: i64) -> Form {
        let mut form = Form::new();
        form.set_i64("n", n);
        form.set_string("p1", "aaaa");
        form
    }

    #[test]
    fn test_seal_then_decode() {
        let t = transport(1);
        let frame = t.seal_form(&sample(7)).unwrap();

        let declared = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        assert_eq!(declared as usize, frame.len());
        assert_eq!(
            frame.len(),
            4 + SEAL_OVERHEAD + sample(7).serialize().len()
        );

        let forms = t.decoder().push(&frame).unwrap();
        assert_eq!(forms, vec![sample(7)]);
    }

    #[test]
    fn test_decoder_handles_split_frames() {
        let t = transport(1);
        let mut stream = t.seal_form(&sample(1)).unwrap().to_vec();
        stream.extend_from_slice(&t.seal_form(&sample(2)).unwrap());

        let mut decoder = t.decoder();
        let mut seen = Vec::new();
        for piece in stream.chunks(5) {
            seen.extend(decoder.push(piece).unwrap());
        }
        assert_eq!(seen, vec![sample(1), sample(2)]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_wrong_key_is_crypto_error() {
        let frame = transport(1).seal_form(&sample(1)).unwrap();
        let result = transport(2).decoder().push(&frame);
        assert!(matches!(result, Err(FormlinkError::Crypto)));
    }

    #[test]
    fn test_oversized_form_cannot_be_sealed() {
        let t = SecureTransport::new(FrameCipher::new(&[1; 32]), 64);
        let mut form = Form::new();
        form.set_bytes("blob", vec![0u8; 100]);
        assert!(matches!(
            t.seal_form(&form),
            Err(FormlinkError::FrameLength { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_forms_delivers_before_error() {
        let t = transport(1);
        let (mut tx, rx) = duplex(64 * 1024);

        let mut data = t.seal_form(&sample(1)).unwrap().to_vec();
        data.extend_from_slice(&encode_length(0, DEFAULT_MAX_FRAME_SIZE).unwrap());
        data.extend_from_slice(&[0u8; 8]);
        tx.write_all(&data).await.unwrap();

        let shutdown = CancellationToken::new();
        let mut seen = Vec::new();
        let result = t
            .read_forms(rx, &shutdown, |form| {
                seen.push(form);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(FormlinkError::Crypto)));
        assert_eq!(seen, vec![sample(1)]);
    }

    #[tokio::test]
    async fn test_read_forms_stops_on_eof() {
        let t = transport(1);
        let (mut tx, rx) = duplex(4096);
        tx.write_all(&t.seal_form(&sample(3)).unwrap()).await.unwrap();
        drop(tx);

        let shutdown = CancellationToken::new();
        let mut count = 0;
        t.read_forms(rx, &shutdown, |_| {
            count += 1;
            async { Ok(()) }
        })
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_read_forms_stops_on_cancel() {
        let t = transport(1);
        let (_tx, rx) = duplex(4096);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result = t.read_forms(rx, &shutdown, |_| async { Ok(()) }).await;
        assert!(result.is_ok());
    }
}
