// Stage prompts and system instructions

use crate::models::SubmissionKind;

pub const FILE_ANALYSIS_SYSTEM: &str = "You are an expert reviewer of student submissions, including source code, notebooks and documents. Describe the structure and content of a submission precisely. Use plain text formatting only - no asterisks, bullet points, or markdown.";

pub const RESEARCH_SYSTEM: &str = "You are an expert educational research assistant. Generate effective and simple search queries to find relevant information that will help verify student answers. Do not use formatting like asterisks, bullets, or markdown.";

pub const ANALYSIS_SYSTEM: &str = "You are an expert educational analyst with deep subject matter expertise. Analyze student work with precision and insight. Use plain text formatting in your response - no asterisks, bullet points, or markdown formatting.";

pub const GRADING_SYSTEM: &str = "You are an experienced teacher providing fair and constructive feedback. Be specific, balanced, and focused on helping the student improve. Use plain text formatting only - no asterisks, bullet points, or markdown.";

pub const SOLUTION_SYSTEM: &str = "You are an expert tutor who writes clear, correct model answers. When the submission is code, produce a complete improved version that fixes the identified issues and follows good practice.";

pub fn file_analysis_prompt(question: &str, submission: &str, kind: &SubmissionKind) -> String {
    let focus = if kind.is_code() {
        "the programming language, overall program structure, functions and data structures used, correctness risks, error handling, and code style"
    } else {
        "the document structure, sections and headings, the main claims made, and any obvious gaps or formatting problems"
    };
    format!(
        "Analyze the structure of this student submission before it is graded.\n\n\
Submission type: {}\n\n\
Assignment question: {}\n\n\
Submission:\n{}\n\n\
Describe {}. List notable issues in plain sentences. Do not assign a grade.",
        kind.describe(),
        question,
        submission,
        focus
    )
}

pub fn research_prompt(question: &str, submission: &str, file_analysis: Option<&str>) -> String {
    let mut prompt = format!(
        "I need to check a student's assignment answer for accuracy and quality.\n\
Assignment question: {}\n\
Student's answer: {}\n",
        question, submission
    );
    if let Some(fa) = file_analysis {
        prompt.push_str(&format!("Submission structure notes: {}\n", fa));
    }
    prompt.push_str(
        "\nGenerate a simple, concise search query (just one or two keywords or phrases) that will help me find relevant information \
to verify the accuracy and completeness of this answer. Do not include formatting characters like asterisks, bullet points, \
or markdown formatting. Just provide plain text terms.",
    );
    prompt
}

pub fn analysis_prompt(
    question: &str,
    submission: &str,
    reference_material: &str,
    search_results: &str,
    file_analysis: Option<&str>,
) -> String {
    let file_section = file_analysis
        .map(|fa| format!("File analysis: {}\n\n", fa))
        .unwrap_or_default();
    format!(
        "Please analyze this student's answer thoroughly.\n\n\
Assignment question: {}\n\n\
Student's answer: {}\n\n\
Reference material: {}\n\n\
Research findings from web: {}\n\n\
{}\
Analyze:\n\
1. Accuracy: Are the facts, concepts, and information correct?\n\
2. Completeness: Does the answer address all aspects of the question?\n\
3. Understanding: Does the student demonstrate understanding of the core concepts?\n\
4. Critical thinking: Is there evidence of analysis, evaluation, or original thought?\n\
5. Structure: Is the answer well-organized and clearly expressed?\n\n\
Provide a detailed analysis that identifies specific strengths and weaknesses. Use plain text formatting without asterisks, \
bullet points, or other markdown. Present your analysis in clear paragraphs with simple section headings only.",
        question, submission, reference_material, search_results, file_section
    )
}

pub fn grading_prompt(question: &str, submission: &str, analysis: &str) -> String {
    format!(
        "Based on your analysis, please:\n\n\
1. Assign a numerical grade (0-100) to this answer\n\
2. Provide detailed, constructive feedback that will help the student improve\n\
3. Include specific examples from their answer to illustrate your points\n\
4. Suggest concrete steps for improvement\n\
5. Highlight strengths to reinforce positive aspects\n\n\
Assignment question: {}\n\n\
Student's answer: {}\n\n\
Your analysis: {}\n\n\
Format your response as follows:\n\n\
GRADE: [numerical grade]\n\n\
FEEDBACK:\n\
[Your detailed feedback here, organized into clear sections with simple headings. Use plain text only - no asterisks, bullet points, or markdown formatting.]",
        question, submission, analysis
    )
}

pub fn solution_prompt(
    question: &str,
    submission: &str,
    analysis: &str,
    feedback: &str,
    kind: Option<&SubmissionKind>,
) -> String {
    let target = match kind {
        Some(k) if k.is_code() => "Write an optimized, corrected version of the student's code. Keep the student's overall approach where it is sound, and add brief comments where the fix is not obvious.",
        _ => "Write an improved model answer that addresses every weakness identified above while keeping the student's valid points.",
    };
    format!(
        "Assignment question: {}\n\n\
Student's answer: {}\n\n\
Analysis: {}\n\n\
Grading feedback: {}\n\n\
{} After the solution, explain the main improvements in a few plain sentences.",
        question, submission, analysis, feedback, target
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_prompt_covers_dimensions() {
        let prompt = analysis_prompt("Q", "A", "R", "S", None);
        for dim in ["Accuracy", "Completeness", "Understanding", "Critical thinking", "Structure"] {
            assert!(prompt.contains(dim), "missing {}", dim);
        }
        assert!(!prompt.contains("File analysis:"));
        assert!(analysis_prompt("Q", "A", "R", "S", Some("two functions")).contains("File analysis: two functions"));
    }

    #[test]
    fn test_grading_prompt_format_instructions() {
        let prompt = grading_prompt("Q", "A", "analysis");
        assert!(prompt.contains("GRADE: [numerical grade]"));
        assert!(prompt.contains("FEEDBACK:"));
    }

    #[test]
    fn test_file_analysis_prompt_by_kind() {
        let code = file_analysis_prompt("Q", "int main() {}", &SubmissionKind::Code("C++".to_string()));
        assert!(code.contains("C++ source file"));
        assert!(code.contains("programming language"));
        let doc = file_analysis_prompt("Q", "Essay", &SubmissionKind::Pdf);
        assert!(doc.contains("document structure"));
    }
}
