use crate::stream::types::{EncodingProfile, FramerateClass, ValidUrl};

/// AAC bitrate label for a capture sample rate. Anything unrecognized gets
/// the 64k default.
pub fn audio_bitrate_label(sample_rate: u32) -> &'static str {
    match sample_rate {
        11_025 => "11k",
        22_050 => "22k",
        44_100 => "44k",
        _ => "64k",
    }
}

/// Builds the ffmpeg argument vector for one stream. The skeleton reads raw
/// media from stdin, encodes libx264 ultrafast/zerolatency + AAC and pushes
/// FLV to the destination. The 1 fps and 15 fps profiles splice their GOP
/// layout between the preset and the tune arguments; argument order is part
/// of the encoder contract and must not be shuffled.
pub fn build_options(profile: &EncodingProfile, destination: &ValidUrl) -> Vec<String> {
    let mut args: Vec<String> = ["-i", "-", "-c:v", "libx264", "-preset", "ultrafast"]
        .map(String::from)
        .to_vec();

    match profile.framerate {
        FramerateClass::Fps1 => {
            args.extend(
                [
                    "-r",
                    "1",
                    "-g",
                    "2",
                    "-keyint_min",
                    "2",
                    "-x264opts",
                    "keyint=2",
                    "-crf",
                    "25",
                    "-pix_fmt",
                    "yuv420p",
                    "-profile:v",
                    "baseline",
                    "-level",
                    "3",
                ]
                .map(String::from),
            );
        }
        FramerateClass::Fps15 => {
            args.extend(
                [
                    "-max_muxing_queue_size",
                    "1000",
                    "-r",
                    "15",
                    "-g",
                    "30",
                    "-keyint_min",
                    "30",
                    "-x264opts",
                    "keyint=30",
                    "-crf",
                    "25",
                    "-pix_fmt",
                    "yuv420p",
                    "-profile:v",
                    "baseline",
                    "-level",
                    "3",
                ]
                .map(String::from),
            );
        }
        FramerateClass::Other => {}
    }

    args.extend(["-tune", "zerolatency", "-c:a", "aac"].map(String::from));
    args.push("-ar".to_string());
    args.push(profile.audio_sample_rate.to_string());
    args.push("-b:a".to_string());
    args.push(audio_bitrate_label(profile.audio_sample_rate).to_string());
    args.extend(["-bufsize", "5000", "-f", "flv"].map(String::from));
    args.push(destination.as_str().to_string());

    args
}
