//! Channel selection and reordering
//!
//! A map lists source channel indices (0-based) in output order, so it can
//! select a subset, swap channels or duplicate one. An empty map forwards
//! every channel unchanged.

use crate::protocol::StreamConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMap {
    indices: Vec<usize>,
}

impl ChannelMap {
    /// Forward all channels unchanged
    pub fn identity() -> Self {
        Self::default()
    }

    /// Build a map for a stream with `channels` channels
    ///
    /// Indices the stream does not have are dropped with a warning. If none
    /// survive, the map falls back to identity so playback continues.
    pub fn build(selection: &[usize], channels: u16) -> Self {
        let mut indices = Vec::with_capacity(selection.len());
        for &index in selection {
            if index < channels as usize {
                indices.push(index);
            } else {
                tracing::warn!(
                    "Channel {} not present in a {}-channel stream, dropping it",
                    index,
                    channels
                );
            }
        }

        if indices.is_empty() && !selection.is_empty() {
            tracing::warn!("No selected channel exists in the stream, forwarding all channels");
        }

        Self { indices }
    }

    pub fn is_identity(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    fn valid_indices(&self, channels: u16) -> impl Iterator<Item = usize> + '_ {
        self.indices
            .iter()
            .copied()
            .filter(move |&i| i < channels as usize)
    }

    /// Channel count of the mapped output for an input with `channels`
    pub fn output_channels(&self, channels: u16) -> u16 {
        match self.valid_indices(channels).count() {
            0 => channels,
            n => n as u16,
        }
    }

    /// Format the backend receives for an input stream `config`
    pub fn output_config(&self, config: &StreamConfig) -> StreamConfig {
        config.with_channels(self.output_channels(config.channels))
    }

    /// Route the interleaved `input` into `output`, frame by frame
    ///
    /// `output` is cleared first. Trailing bytes that do not form a whole
    /// frame are ignored, and indices outside the input are skipped.
    pub fn apply(&self, config: &StreamConfig, input: &[u8], output: &mut Vec<u8>) {
        output.clear();

        let width = config.bytes_per_sample();
        let stride = config.frame_stride();
        if stride == 0 {
            return;
        }

        let passthrough = self.valid_indices(config.channels).next().is_none()
            || self
                .valid_indices(config.channels)
                .eq(0..config.channels as usize);
        if passthrough {
            let whole = input.len() - input.len() % stride;
            output.extend_from_slice(&input[..whole]);
            return;
        }

        let out_stride = self.output_channels(config.channels) as usize * width;
        output.reserve(input.len() / stride * out_stride);

        for frame in input.chunks_exact(stride) {
            for index in self.valid_indices(config.channels) {
                let start = index * width;
                if let Some(sample) = frame.get(start..start + width) {
                    output.extend_from_slice(sample);
                }
            }
        }
    }
}

/// Parse an operator channel list such as `"0,1"` or `"1, 0, 0"`
pub fn parse_channel_list(list: &str) -> Result<Vec<usize>, String> {
    list.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<usize>()
                .map_err(|_| format!("invalid channel index '{}'", token))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SampleEncoding;
    use proptest::prelude::*;

    fn s16(channels: u16) -> StreamConfig {
        StreamConfig::new(48000, channels, SampleEncoding::I16)
    }

    /// Frames whose samples encode (frame, channel) so routing is visible
    fn tagged_frames(channels: u16, frames: usize) -> Vec<u8> {
        let mut data = Vec::new();
        for f in 0..frames {
            for c in 0..channels {
                data.extend_from_slice(&[f as u8, c as u8]);
            }
        }
        data
    }

    #[test]
    fn test_identity_forwards_unchanged() {
        let input = tagged_frames(2, 64);
        let mut output = Vec::new();
        ChannelMap::identity().apply(&s16(2), &input, &mut output);
        assert_eq!(output, input);
    }

    #[test]
    fn test_swap_channels() {
        let map = ChannelMap::build(&[1, 0], 2);
        let input = tagged_frames(2, 2);
        let mut output = Vec::new();
        map.apply(&s16(2), &input, &mut output);
        assert_eq!(output, vec![0, 1, 0, 0, 1, 1, 1, 0]);
    }

    #[test]
    fn test_subset_and_duplicate() {
        let map = ChannelMap::build(&[2, 2, 0], 4);
        assert_eq!(map.output_channels(4), 3);

        let input = tagged_frames(4, 1);
        let mut output = Vec::new();
        map.apply(&s16(4), &input, &mut output);
        assert_eq!(output, vec![0, 2, 0, 2, 0, 0]);
    }

    #[test]
    fn test_build_drops_missing_channels() {
        let map = ChannelMap::build(&[0, 5, 1], 2);
        assert_eq!(map.indices(), &[0, 1]);
    }

    #[test]
    fn test_build_falls_back_to_identity() {
        let map = ChannelMap::build(&[4, 5], 2);
        assert!(map.is_identity());
        assert_eq!(map.output_channels(2), 2);
    }

    #[test]
    fn test_output_config() {
        let map = ChannelMap::build(&[1], 2);
        let out = map.output_config(&s16(2));
        assert_eq!(out.channels, 1);
        assert_eq!(out.sample_rate, 48000);
    }

    #[test]
    fn test_parse_channel_list() {
        assert_eq!(parse_channel_list("0,1"), Ok(vec![0, 1]));
        assert_eq!(parse_channel_list(" 3, 0 ,0 "), Ok(vec![3, 0, 0]));
        assert_eq!(parse_channel_list(""), Ok(vec![]));
        assert!(parse_channel_list("a,1").is_err());
        assert!(parse_channel_list("-1").is_err());
    }

    proptest! {
        #[test]
        fn prop_apply_never_reads_out_of_bounds(
            channels in 1u16..=8,
            selection in proptest::collection::vec(0usize..12, 0..10),
            frames in 1usize..16,
        ) {
            let config = s16(channels);
            let input = tagged_frames(channels, frames);
            // Deliberately skip build() so out-of-range indices reach apply
            let map = ChannelMap { indices: selection.clone() };
            let mut output = Vec::new();
            map.apply(&config, &input, &mut output);

            let valid: Vec<usize> = selection
                .iter()
                .copied()
                .filter(|&i| i < channels as usize)
                .collect();
            let out_channels = if valid.is_empty() { channels as usize } else { valid.len() };
            prop_assert_eq!(output.len(), frames * out_channels * 2);

            for (n, sample) in output.chunks_exact(2).enumerate() {
                let frame = n / out_channels;
                let slot = n % out_channels;
                let source = if valid.is_empty() { slot } else { valid[slot] };
                prop_assert_eq!(sample, &[frame as u8, source as u8][..]);
            }
        }

        #[test]
        fn prop_build_keeps_only_existing_channels(
            channels in 1u16..=8,
            selection in proptest::collection::vec(0usize..12, 0..10),
        ) {
            let map = ChannelMap::build(&selection, channels);
            prop_assert!(map.indices().iter().all(|&i| i < channels as usize));
            let expected: Vec<usize> = selection
                .into_iter()
                .filter(|&i| i < channels as usize)
                .collect();
            prop_assert_eq!(map.indices(), &expected[..]);
        }
    }
}
