use kiln_protocol::{StoryContent, StoryDraft, StoryMedia};

use crate::error::StoryError;

/// Longest accepted text overlay, in characters.
pub const MAX_OVERLAY_CHARS: usize = 200;

/// Resolve a capture draft into exactly one primary payload.
///
/// Precedence is video, image, text, then background color. Blank strings
/// count as absent.
pub fn resolve_draft(draft: &StoryDraft) -> Result<StoryContent, StoryError> {
    let video = non_blank(&draft.video_url);
    let image = non_blank(&draft.image_url);
    let text = non_blank(&draft.text);
    let color = non_blank(&draft.background_color);

    let primary = if let Some(url) = video {
        StoryMedia::Video {
            url,
            thumbnail_url: non_blank(&draft.thumbnail_url),
        }
    } else if let Some(url) = image {
        StoryMedia::Image { url }
    } else if let Some(body) = text {
        StoryMedia::Text {
            body,
            background_color: color,
        }
    } else if let Some(background_color) = color {
        StoryMedia::Color { background_color }
    } else {
        return Err(StoryError::InvalidContent(
            "one of image, video, text or background color is required".into(),
        ));
    };

    let overlay_text = non_blank(&draft.overlay_text);
    if let Some(overlay) = overlay_text.as_deref() {
        let chars = overlay.chars().count();
        if chars > MAX_OVERLAY_CHARS {
            return Err(StoryError::InvalidContent(format!(
                "overlay text is {chars} characters, limit is {MAX_OVERLAY_CHARS}"
            )));
        }
    }

    Ok(StoryContent {
        primary,
        overlay_text,
    })
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
