use serde::Serialize;

/// Target resolution for one output variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TranscodeProfile {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Every asset is transcoded into exactly these variants. Readiness responses
/// list them in this order.
pub const PROFILES: [TranscodeProfile; 4] = [
    TranscodeProfile { name: "360p", width: 640, height: 360 },
    TranscodeProfile { name: "480p", width: 854, height: 480 },
    TranscodeProfile { name: "720p", width: 1280, height: 720 },
    TranscodeProfile { name: "1080p", width: 1920, height: 1080 },
];

impl TranscodeProfile {
    pub fn by_name(name: &str) -> Option<&'static TranscodeProfile> {
        PROFILES.iter().find(|p| p.name == name)
    }

    /// `WxH`, the form ffmpeg's size options expect.
    pub fn dimensions(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_are_ordered_by_resolution() {
        let names: Vec<_> = PROFILES.iter().map(|p| p.name).collect();
        assert_eq!(names, ["360p", "480p", "720p", "1080p"]);
        assert!(PROFILES.windows(2).all(|w| w[0].height < w[1].height));
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(TranscodeProfile::by_name("720p").map(|p| p.width), Some(1280));
        assert!(TranscodeProfile::by_name("4k").is_none());
    }

    #[test]
    fn dimensions_format() {
        assert_eq!(PROFILES[1].dimensions(), "854x480");
    }
}
