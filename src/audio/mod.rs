//! Audio subsystem module

pub mod backend;
pub mod buffer;
pub mod channel_map;
pub mod convert;
pub mod device;

pub use backend::{
    requested_buffer_frames, AudioBackend, BackendOptions, BackendRegistry, PlaybackHandle,
};
pub use buffer::SampleQueue;
pub use channel_map::{parse_channel_list, ChannelMap};
pub use device::{get_output_device, list_output_devices, OutputDeviceInfo};
