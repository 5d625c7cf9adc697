//! Second model pass that explains a tool result in plain language.

use crate::core::config::ImagePolicy;
use crate::core::llm::ModelRequest;
use crate::core::normalize::CanonicalResult;

pub fn build_summary_request(
    query: &str,
    result: &CanonicalResult,
    policy: ImagePolicy,
) -> ModelRequest {
    let text = result.text();
    let mut prompt = format!("Here is the result for the query '{query}': {text}");

    let image_count = result.image_count();
    if image_count == 0 {
        return ModelRequest::text(prompt);
    }

    match policy {
        ImagePolicy::Describe => {
            prompt.push_str(&format!(
                "\n\nThe tool also returned {} not shown here. Mention that it was captured, \
but do not guess at its contents.",
                plural_images(image_count)
            ));
            ModelRequest::text(prompt)
        }
        ImagePolicy::Attach => {
            prompt.push_str(&format!(
                "\n\nThe tool also returned {}, attached below. Describe what you see.",
                plural_images(image_count)
            ));
            ModelRequest {
                prompt,
                images: result.image_data_uris(),
            }
        }
    }
}

fn plural_images(count: usize) -> String {
    if count == 1 {
        "1 image".to_string()
    } else {
        format!("{count} images")
    }
}
