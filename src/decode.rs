//! The audio decoder collaborator (spec §6): `decode(path) → (samples_f32,
//! channels, source_rate)`. Out of the core's scope per spec §1 ("container/
//! codec decoding" is an external collaborator), but a concrete
//! implementation is needed to run the CLI, so one is provided here behind
//! a small trait.

use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Error, Result};

/// Decoded audio: interleaved samples, channel count, and the container's
/// native sample rate. The front end (spec §4.A) does the mono-mix and
/// resample; this trait only decodes.
pub struct DecodedAudio {
    pub interleaved: Vec<f32>,
    pub channels: u16,
    pub source_rate: u32,
}

pub trait AudioDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedAudio>;
}

/// Decodes any container/codec `symphonia` supports (the teacher's own
/// dependency, used here through the full-formats feature set).
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        let src = std::fs::File::open(path)
            .map_err(|e| Error::DecodeFailure(format!("failed to open {}: {e}", path.display())))?;
        let mss = MediaSourceStream::new(Box::new(src), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|s| s.to_str()) {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| Error::DecodeFailure(format!("unsupported format: {e}")))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
            .ok_or_else(|| Error::DecodeFailure("no compatible audio track found".into()))?;

        let track_id = track.id;
        let source_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::DecodeFailure("track has no sample rate".into()))?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(1);

        let dec_opts: DecoderOptions = Default::default();
        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &dec_opts)
            .map_err(|e| Error::DecodeFailure(format!("failed to build decoder: {e}")))?;

        let mut interleaved: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    log::warn!("decoder reset required for {}, stopping early", path.display());
                    break;
                }
                Err(err) => {
                    return Err(Error::DecodeFailure(format!("packet read failed: {err}")));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buf.copy_interleaved_ref(decoded);
                    interleaved.extend_from_slice(buf.samples());
                }
                Err(SymphoniaError::DecodeError(err)) => {
                    log::warn!("packet decode error in {}: {err}", path.display());
                }
                Err(err) => {
                    return Err(Error::DecodeFailure(format!("fatal decode error: {err}")));
                }
            }
        }

        Ok(DecodedAudio {
            interleaved,
            channels,
            source_rate,
        })
    }
}
