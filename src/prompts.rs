//! Prompts sent to the extraction and summary backends.
//!
//! Callers can override the OCR prompts via
//! [`crate::config::OcrConfig::system_prompt`] and
//! [`crate::config::OcrConfig::user_prompt`]; the constants here are used
//! only when no override is provided.

/// Default system instruction for transcribing page images.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an OCR assistant. Extract all text from the provided images \
(Describe images as if you're explaining them to a blind person eg: `[Image: In this picture, 8 people are posed hugging each other]`), \
which are attached to the document. Use markdown formatting for:

- Headings (# for main, ## for sub)
- Lists (- for unordered, 1. for ordered)
- Emphasis (* for italics, ** for bold)
- Links ([text](URL))
- Tables (use markdown table format)

For non-text elements, describe them: [Image: Brief description]

Maintain logical flow and use horizontal rules (---) to separate sections if needed. Adjust formatting to preserve readability.

Note any issues or ambiguities at the end of your output.

Be thorough and accurate in transcribing all text content.";

/// Default user instruction: bookkeeping-oriented invoice reading.
pub const DEFAULT_USER_PROMPT: &str = r#"You are an expert in bookkeeping. Your task is to read and analyze financial invoices or bills, translating them into English if needed, and then extract all relevant purchase information.

## Steps

1. **Translation**
- If the invoice or bill is not in English, translate the entire document into English.

2. **Extraction**
- Identify key pieces of information typically present in invoices and bills:
    - **Vendor Information**: Name, address, contact details, GSTIN, code.
    - **Invoice Details**: Invoice number, date of issue, due date.
    - **Itemized Purchases**: List each item or service provided, including Challan No, Part No / Item Code, HSN/SAC, description, quantity, unit price, and total price.
    - **Payment Terms**: Payment methods, terms for discounts, late fees.
    - **Total Amount Due**: Including any applicable taxes and additional charges.
    - **Currency**: Specify the currency in which the transaction is made.
    - **Identifier**: Locate a handwritten number and date stacked in the invoice and tag them as ref no, ref date.

3. **Completion**
- Review extracted data for accuracy and completeness.
- Format the extracted information clearly and systematically.

# Output Format

- Provide the extracted information in a bulleted or table format for easy readability.
- Ensure all relevant details are included and clearly labeled for each category of information.

# Notes

- Ensure that translations preserve the meaning and context of the original invoice.
- Extraction should prioritize accuracy and clarity, maintaining the integrity of financial data.
- Never skip any context. Reproduce the document as is, using markdown effectively. Transcribe images sequentially, preserving order and completeness. Separate images with `---`. No skips or comments. Start with the first image immediately."#;

/// Instruction added when a batch carries more than one page.
pub const MULTI_PAGE_INSTRUCTION: &str = "Please perform OCR on the following images. \
Ensure that the extracted text includes the corresponding page numbers.";

/// Label attached to a single-page request.
pub fn page_label(page_number: usize) -> String {
    format!("Page {page_number}:")
}

/// Label listing every page of a multi-page batch, in attachment order.
pub fn batch_label(page_numbers: &[usize]) -> String {
    let labels: Vec<String> = page_numbers.iter().map(|&n| page_label(n)).collect();
    format!(
        "{MULTI_PAGE_INSTRUCTION}\nThe images are attached in this order: {}",
        labels.join(" ")
    )
}

/// System prompt asking for a short JSON-only summary of a document.
pub fn summary_prompt(character_limit: usize) -> String {
    format!(
        "You are an AI assistant tasked with extracting relevant information only. \
Please provide a concise summary in {character_limit} characters or less in JSON form. \
Reply with only the answer in JSON form and include no other commentary:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_mentions_bracketed_annotations() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("[Image: Brief description]"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("markdown table"));
    }

    #[test]
    fn batch_label_lists_pages_in_order() {
        let label = batch_label(&[3, 4, 5]);
        assert!(label.starts_with(MULTI_PAGE_INSTRUCTION));
        assert!(label.ends_with("Page 3: Page 4: Page 5:"));
    }

    #[test]
    fn summary_prompt_embeds_limit() {
        assert!(summary_prompt(250).contains("250 characters"));
    }
}
