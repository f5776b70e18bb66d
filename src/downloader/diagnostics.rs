// Unavailability diagnostics - identifies why a platform refused a video
//
// yt-dlp reports every failure as free text on stderr. This module maps the
// well-known messages to a reason so callers can tell a private video apart
// from a flaky network.

use serde::{Deserialize, Serialize};

/// Reasons a video could not be resolved or fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unavailability {
    /// DRM-protected or paid content (Premium, rentals)
    DrmProtected,

    /// Requires channel membership
    MembersOnly,

    /// Age-restricted content requiring login
    AgeRestricted,

    /// Private video requiring authorization
    PrivateVideo,

    /// Deleted, removed or otherwise unavailable
    VideoUnavailable,

    /// Geographic restriction
    GeoBlocked,

    /// 429 or similar
    RateLimited,

    /// Captcha / "confirm you're not a bot"
    BotDetection,

    /// HTTP 403 without a more specific reason
    Forbidden,

    /// Timeout, refused connection, unreachable network
    NetworkTimeout,
}

impl Unavailability {
    /// No amount of retrying changes the outcome for these.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::DrmProtected | Self::VideoUnavailable | Self::PrivateVideo | Self::MembersOnly
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::DrmProtected => "Video is DRM-protected",
            Self::MembersOnly => "Video requires channel membership",
            Self::AgeRestricted => "Video is age-restricted",
            Self::PrivateVideo => "Video is private",
            Self::VideoUnavailable => "Video is unavailable",
            Self::GeoBlocked => "Video is blocked in your country",
            Self::RateLimited => "Platform is rate-limiting requests",
            Self::BotDetection => "Platform requested bot verification",
            Self::Forbidden => "Access denied (403)",
            Self::NetworkTimeout => "Network timeout",
        }
    }
}

/// Analyze an error message and return the unavailability reason, if any
pub fn diagnose_error(error: &str) -> Option<Unavailability> {
    let lower = error.to_lowercase();

    // Checked in order of specificity

    if lower.contains("drm")
        || lower.contains("widevine")
        || lower.contains("youtube premium")
        || lower.contains("requires purchase")
        || lower.contains("rental")
        || lower.contains("this video requires payment")
    {
        return Some(Unavailability::DrmProtected);
    }

    if lower.contains("members only")
        || lower.contains("members-only")
        || lower.contains("join this channel")
        || lower.contains("available to members")
    {
        return Some(Unavailability::MembersOnly);
    }

    if lower.contains("age-restricted")
        || lower.contains("sign in to confirm your age")
        || lower.contains("age_verification")
    {
        return Some(Unavailability::AgeRestricted);
    }

    if lower.contains("private video")
        || lower.contains("video is private")
        || lower.contains("sign in if you've been granted access")
    {
        return Some(Unavailability::PrivateVideo);
    }

    if lower.contains("video unavailable")
        || lower.contains("video has been removed")
        || lower.contains("this video is no longer available")
        || lower.contains("video is unavailable")
    {
        return Some(Unavailability::VideoUnavailable);
    }

    if lower.contains("available in your country")
        || lower.contains("blocked in your country")
        || lower.contains("geo restriction")
        || lower.contains("geo-restricted")
    {
        return Some(Unavailability::GeoBlocked);
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return Some(Unavailability::RateLimited);
    }

    if lower.contains("not a bot")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
    {
        return Some(Unavailability::BotDetection);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(Unavailability::Forbidden);
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("network is unreachable")
        || lower.contains("name or service not known")
    {
        return Some(Unavailability::NetworkTimeout);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_403_detection() {
        let error = "ERROR: unable to download video data: HTTP Error 403: Forbidden";
        assert_eq!(diagnose_error(error), Some(Unavailability::Forbidden));
    }

    #[test]
    fn test_age_restricted_detection() {
        let error = "ERROR: [youtube] xyz: Sign in to confirm your age. This video may be inappropriate for some users.";
        assert_eq!(diagnose_error(error), Some(Unavailability::AgeRestricted));
    }

    #[test]
    fn test_unavailable_detection() {
        let error = "ERROR: [youtube] abcdefghijk: Video unavailable";
        assert_eq!(diagnose_error(error), Some(Unavailability::VideoUnavailable));
        assert!(Unavailability::VideoUnavailable.is_permanent());
    }

    #[test]
    fn test_geo_detection() {
        let error = "The uploader has not made this video available in your country";
        assert_eq!(diagnose_error(error), Some(Unavailability::GeoBlocked));
    }

    #[test]
    fn test_bot_detection() {
        let error = "ERROR: [youtube] id: Sign in to confirm you're not a bot";
        assert_eq!(diagnose_error(error), Some(Unavailability::BotDetection));
    }

    #[test]
    fn test_timeout_detection() {
        let error = "<urlopen error timed out>";
        assert_eq!(diagnose_error(error), Some(Unavailability::NetworkTimeout));
        assert!(!Unavailability::NetworkTimeout.is_permanent());
    }

    #[test]
    fn test_unrecognized_message() {
        assert_eq!(diagnose_error("ERROR: Unsupported URL: https://x"), None);
        assert_eq!(diagnose_error(""), None);
    }
}
