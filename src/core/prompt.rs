//! Enhancement prompt assembly and response heuristics.

use super::models::{DocumentType, TargetLanguage};

/// Responses at or below this many characters skip the diacritic check.
pub const DIACRITIC_CHECK_MIN_CHARS: usize = 20;

const BASE_INSTRUCTIONS: &str = "Please improve the following OCR text by:
1. Correcting spelling and OCR errors
2. Fixing formatting and spacing issues
3. Preserving the original structure and meaning
4. Maintaining all important information";

const VIETNAMESE_INSTRUCTIONS: &str = "
5. CRITICAL: If the text is in Vietnamese, you MUST add proper tone marks (dấu thanh):
   - à, á, ả, ã, ạ for 'a'
   - è, é, ẻ, ẽ, ẹ for 'e'
   - ì, í, ỉ, ĩ, ị for 'i'
   - ò, ó, ỏ, õ, ọ for 'o'
   - ù, ú, ủ, ũ, ụ for 'u'
   - ỳ, ý, ỷ, ỹ, ỵ for 'y'
   - đ for 'd'
   - And all compound vowels: ă, â, ê, ô, ơ, ư with their tones
6. If the text is in another language, translate it to Vietnamese with proper tone marks
7. Examples:
   - \"Truong Dai hoc\" → \"Trường Đại học\"
   - \"Ha Noi\" → \"Hà Nội\"
   - \"Viet Nam\" → \"Việt Nam\"
";

const ENGLISH_INSTRUCTIONS: &str = "\n5. Translate to English if the text is in another language";

const VISION_BASE: &str =
    "Please extract and correct the text from this image, fixing any OCR errors.";

const VISION_VIETNAMESE: &str = "
CRITICAL: Ensure Vietnamese text has proper tone marks (dấu thanh):
- Use à, á, ả, ã, ạ, ă, ằ, ắ, ẳ, ẵ, ặ, â, ầ, ấ, ẩ, ẫ, ậ for 'a'
- Use è, é, ẻ, ẽ, ẹ, ê, ề, ế, ể, ễ, ệ for 'e'
- Use ò, ó, ỏ, õ, ọ, ô, ồ, ố, ổ, ỗ, ộ, ơ, ờ, ớ, ở, ỡ, ợ for 'o'
- Use ù, ú, ủ, ũ, ụ, ư, ừ, ứ, ử, ữ, ự for 'u'
- Use đ for 'd'

If text is in another language, translate to Vietnamese with proper tone marks.
Return ONLY the corrected text.";

const fn document_addendum(document_type: DocumentType) -> &'static str {
    match document_type {
        DocumentType::General => "",
        DocumentType::Code => {
            "\nThis appears to be code or technical documentation. Please preserve code syntax and technical terms.\n"
        }
        DocumentType::Invoice => {
            "\nThis appears to be an invoice or receipt. Please preserve numbers, dates, and financial information accurately.\n"
        }
        DocumentType::Form => "\nThis appears to be a form. Please preserve field labels and structure.\n",
    }
}

/// Build the text-completion prompt.
#[must_use]
pub fn enhancement_prompt(text: &str, document_type: DocumentType, language: TargetLanguage) -> String {
    let language_block = match language {
        TargetLanguage::Vietnamese => VIETNAMESE_INSTRUCTIONS,
        TargetLanguage::English => ENGLISH_INSTRUCTIONS,
        TargetLanguage::Auto => "",
    };

    format!(
        "{BASE_INSTRUCTIONS}{language_block}\n\n\
         IMPORTANT: Return ONLY the corrected text, without any explanations or comments.\n\n\
         Original OCR text:\n{addendum}\n{text}\n\nCorrected text:",
        addendum = document_addendum(document_type),
    )
}

/// Build the prompt sent alongside an image.
#[must_use]
pub fn vision_prompt(language: TargetLanguage) -> String {
    let suffix = match language {
        TargetLanguage::Vietnamese => VISION_VIETNAMESE,
        TargetLanguage::English => {
            " If text is in another language, translate to English. Return ONLY the corrected text."
        }
        TargetLanguage::Auto => " Return ONLY the corrected text.",
    };
    format!("{VISION_BASE}{suffix}")
}

/// Whether `response` passes the target-language diacritic check.
///
/// Short responses always pass; they may legitimately be numbers or codes.
#[must_use]
pub fn has_required_diacritics(response: &str, language: TargetLanguage) -> bool {
    let Some(required) = language.required_diacritics() else {
        return true;
    };
    if response.chars().count() <= DIACRITIC_CHECK_MIN_CHARS {
        return true;
    }
    response
        .chars()
        .flat_map(char::to_lowercase)
        .any(|c| required.contains(c))
}

/// Coarse tags describing how the enhanced text differs from the original.
#[must_use]
pub fn detect_improvements(original: &str, enhanced: &str) -> Vec<String> {
    let mut tags = Vec::new();

    let original_len = original.chars().count();
    let enhanced_len = enhanced.chars().count();
    // Compare in tenths: enhanced > 1.1x or < 0.9x of original.
    if enhanced_len * 10 > original_len * 11 {
        tags.push("Added missing content".to_string());
    } else if enhanced_len * 10 < original_len * 9 {
        tags.push("Removed redundant content".to_string());
    }

    if original.matches('\n').count() != enhanced.matches('\n').count() {
        tags.push("Improved formatting".to_string());
    }

    if original.to_lowercase() != enhanced.to_lowercase() {
        tags.push("Corrected spelling/grammar".to_string());
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_ends_with_text_and_marker() {
        let prompt = enhancement_prompt("helo wrld", DocumentType::General, TargetLanguage::Auto);
        assert!(prompt.starts_with("Please improve the following OCR text by:"));
        assert!(prompt.ends_with("\nhelo wrld\n\nCorrected text:"));
        assert!(!prompt.contains("5."));
    }

    #[test]
    fn document_types_get_distinct_guidance() {
        let code = enhancement_prompt("x", DocumentType::Code, TargetLanguage::Auto);
        let invoice = enhancement_prompt("x", DocumentType::Invoice, TargetLanguage::Auto);
        let form = enhancement_prompt("x", DocumentType::Form, TargetLanguage::Auto);
        assert!(code.contains("preserve code syntax"));
        assert!(invoice.contains("financial information"));
        assert!(form.contains("field labels"));
    }

    #[test]
    fn vietnamese_prompt_lists_tone_marks() {
        let prompt = enhancement_prompt("Ha Noi", DocumentType::General, TargetLanguage::Vietnamese);
        assert!(prompt.contains("dấu thanh"));
        assert!(prompt.contains("\"Ha Noi\" → \"Hà Nội\""));
        let english = enhancement_prompt("x", DocumentType::General, TargetLanguage::English);
        assert!(english.contains("Translate to English"));
    }

    #[test]
    fn vision_prompt_variants() {
        assert!(vision_prompt(TargetLanguage::Auto).ends_with("Return ONLY the corrected text."));
        assert!(vision_prompt(TargetLanguage::English).contains("translate to English"));
        assert!(vision_prompt(TargetLanguage::Vietnamese).contains("Use đ for 'd'"));
    }

    #[test]
    fn diacritic_check_thresholds() {
        let plain = "Truong Dai hoc Bach Khoa Ha Noi";
        assert!(plain.chars().count() > DIACRITIC_CHECK_MIN_CHARS);
        assert!(!has_required_diacritics(plain, TargetLanguage::Vietnamese));
        assert!(has_required_diacritics("Trường Đại học Bách Khoa", TargetLanguage::Vietnamese));
        assert!(has_required_diacritics("12345", TargetLanguage::Vietnamese));
        assert!(has_required_diacritics(plain, TargetLanguage::English));
    }

    #[test]
    fn uppercase_diacritics_count() {
        assert!(has_required_diacritics("ĐẠI HỌC QUỐC GIA THÀNH PHỐ", TargetLanguage::Vietnamese));
    }

    #[test]
    fn improvement_tags() {
        assert!(detect_improvements("same", "same").is_empty());
        assert_eq!(detect_improvements("Hello", "hello"), Vec::<String>::new());

        let tags = detect_improvements("helo", "hello there\nfriend");
        assert_eq!(
            tags,
            vec![
                "Added missing content",
                "Improved formatting",
                "Corrected spelling/grammar"
            ]
        );

        let tags = detect_improvements("hello   world   again", "hello world");
        assert!(tags.contains(&"Removed redundant content".to_string()));
    }
}
