// SPDX-License-Identifier: MPL-2.0

//! GStreamer capture pipeline: `source ! capsfilter ! videoconvert ! appsink`

use super::super::CameraStream;
use super::super::mailbox::FrameMailbox;
use super::super::types::*;
use crate::constants::{pipeline, timing};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// One open device
pub struct GStreamerStream {
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
    format: CameraFormat,
    device_name: String,
    streaming: bool,
    closed: bool,
}

impl GStreamerStream {
    /// Build the pipeline and bring it to READY, which opens the device
    pub fn open(
        device: &CameraDevice,
        gst_device: &gstreamer::Device,
        format: &CameraFormat,
    ) -> BackendResult<Self> {
        info!(device = %device.name, format = %format, "Creating GStreamer pipeline");

        let source = gst_device
            .create_element(None)
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        let mut caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", format.pixel_format.to_gst_format_string())
            .field("width", format.width as i32)
            .field("height", format.height as i32);
        if let Some(fps) = format.framerate {
            caps = caps.field(
                "framerate",
                gstreamer::Fraction::new(fps.num as i32, fps.denom as i32),
            );
        }
        let capsfilter = gstreamer::ElementFactory::make("capsfilter")
            .property("caps", caps.build())
            .build()
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        let convert = gstreamer::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        let sink_caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", pipeline::OUTPUT_FORMAT)
            .build();
        let appsink = AppSink::builder()
            .caps(&sink_caps)
            .max_buffers(pipeline::MAX_BUFFERS)
            .drop(true)
            .sync(false)
            .build();
        appsink.set_property("enable-last-sample", false);

        let gst_pipeline = gstreamer::Pipeline::new();
        gst_pipeline
            .add_many([&source, &capsfilter, &convert, appsink.upcast_ref()])
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;
        gstreamer::Element::link_many([&source, &capsfilter, &convert, appsink.upcast_ref()])
            .map_err(|e| BackendError::FormatNotSupported(format!("{}: {}", format, e)))?;

        let stream = Self {
            pipeline: gst_pipeline,
            appsink,
            format: format.clone(),
            device_name: device.name.clone(),
            streaming: false,
            closed: false,
        };

        // NULL -> READY opens the device node
        if stream.pipeline.set_state(gstreamer::State::Ready).is_err() {
            let err = stream.pipeline_error(device);
            // Dropping the stream returns the pipeline to NULL
            return Err(err);
        }

        Ok(stream)
    }

    /// Translate the error posted on the bus after a failed state change
    fn pipeline_error(&self, device: &CameraDevice) -> BackendError {
        let message = self.pipeline.bus().and_then(|bus| {
            bus.timed_pop_filtered(
                gstreamer::ClockTime::from_mseconds(100),
                &[gstreamer::MessageType::Error],
            )
        });

        match message.as_ref().map(|m| m.view()) {
            Some(gstreamer::MessageView::Error(err)) => {
                if err.error().matches(gstreamer::ResourceError::Busy) {
                    BackendError::DeviceBusy(device.path.clone())
                } else {
                    BackendError::InitializationFailed(err.error().to_string())
                }
            }
            _ => BackendError::InitializationFailed(format!(
                "{} refused to open",
                device.name
            )),
        }
    }
}

impl CameraStream for GStreamerStream {
    fn start(&mut self, mailbox: Arc<FrameMailbox>) -> BackendResult<()> {
        if self.closed {
            return Err(BackendError::NotStreaming);
        }
        if self.streaming {
            return Ok(());
        }

        self.appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let captured_at = Instant::now();
                    let sample = appsink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                    let sequence = mailbox.posted_count() + 1;

                    let (Some(buffer), Some(caps)) = (sample.buffer(), sample.caps()) else {
                        // No payload: wake the consumer so it observes an empty acquire
                        mailbox.notify();
                        return Ok(gstreamer::FlowSuccess::Ok);
                    };
                    if buffer.flags().contains(gstreamer::BufferFlags::CORRUPTED) {
                        if sequence % timing::FRAME_LOG_INTERVAL == 0 {
                            warn!(sequence, "Buffer marked as corrupted, skipping frame");
                        }
                        return Ok(gstreamer::FlowSuccess::Ok);
                    }

                    let video_info = VideoInfo::from_caps(caps).map_err(|e| {
                        error!(error = ?e, "Failed to get video info");
                        gstreamer::FlowError::Error
                    })?;
                    let map = buffer.map_readable().map_err(|e| {
                        error!(error = ?e, "Failed to map buffer");
                        gstreamer::FlowError::Error
                    })?;

                    // The sink recycles its buffers, so the payload is copied out
                    let frame = CameraFrame {
                        width: video_info.width(),
                        height: video_info.height(),
                        data: FrameData::copy_from_slice(map.as_slice()),
                        format: PixelFormat::BGRA,
                        stride: video_info.stride()[0].max(0) as u32,
                        sequence,
                        captured_at,
                    };

                    if sequence % timing::FRAME_LOG_INTERVAL == 0 {
                        debug!(
                            sequence,
                            width = frame.width,
                            height = frame.height,
                            copy_us = captured_at.elapsed().as_micros(),
                            "Frame copied from appsink"
                        );
                    }

                    if mailbox.post(frame) {
                        Ok(gstreamer::FlowSuccess::Ok)
                    } else {
                        Err(gstreamer::FlowError::Flushing)
                    }
                })
                .build(),
        );

        self.pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| BackendError::InitializationFailed(format!("Failed to start pipeline: {}", e)))?;

        let (result, state, pending) = self
            .pipeline
            .state(gstreamer::ClockTime::from_seconds(timing::START_TIMEOUT_SECS));
        debug!(result = ?result, state = ?state, pending = ?pending, "Pipeline state");
        if state != gstreamer::State::Playing {
            warn!(device = %self.device_name, "Pipeline is not in PLAYING state");
        }

        self.streaming = true;
        info!(device = %self.device_name, "GStreamer capture started");
        Ok(())
    }

    fn stop(&mut self) -> BackendResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.streaming = false;
        info!(device = %self.device_name, "Stopping GStreamer pipeline");

        // Clear callbacks first so the mailbox reference is released
        self.appsink
            .set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());

        self.pipeline
            .set_state(gstreamer::State::Null)
            .map_err(|e| BackendError::Other(format!("Failed to stop pipeline: {}", e)))?;

        let (result, state, _) = self
            .pipeline
            .state(gstreamer::ClockTime::from_seconds(timing::STOP_TIMEOUT_SECS));
        match result {
            Ok(_) => info!(state = ?state, "GStreamer pipeline stopped"),
            Err(e) => debug!(error = ?e, state = ?state, "Pipeline state change had issues"),
        }
        Ok(())
    }

    fn format(&self) -> &CameraFormat {
        &self.format
    }
}

impl Drop for GStreamerStream {
    fn drop(&mut self) {
        if !self.closed {
            self.appsink
                .set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
        }
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}
