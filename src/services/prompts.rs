use serde_json::Value;

pub(crate) const STUDENT_EXTRACTION_PROMPT: &str = r#"Analyze the provided image of an answer sheet and extract the required information.
Format the entire output as a single, raw JSON object. Do not include any text, code block markers, or explanations before or after the JSON.

The JSON object must follow this structure exactly:
{
  "student_details": {
    "name": "The student's name, or null if not found",
    "student_id": "The student's ID, or null if not found"
  },
  "questions_attempted": [
    "An array of integer question numbers that the student answered"
  ],
  "answers": [
    {
      "question_number": "The integer number for the question",
      "answer_text": "The full transcribed text of the answer for this question"
    }
  ]
}

Instructions:
1. student_details: If student details like name or ID are not on the page, use null for their values.
2. answers: Transcribe the complete text for each answer accurately.
3. Final Output: Ensure the output is only the JSON object itself, ready for parsing.
"#;

pub(crate) const FEEDBACK_SYSTEM_INSTRUCTION: &str = "You are an educational assistant. You will compare the teacher's answer and the student's answer, \
identify mistakes or gaps in the student's response, and generate constructive feedback. \
Provide detailed, helpful feedback that helps the student understand their mistakes and learn better. \
Structure your feedback clearly with specific points about what was correct, what was incorrect, \
and suggestions for improvement.";

/// Scoring prompt embedding the answer key, the student's answers and the
/// marking scheme.
pub(crate) fn evaluation_prompt(teacher_key: &str, student_script: &Value, scheme: &Value) -> String {
    let student_json = pretty(student_script);
    let scheme_json = pretty(scheme);

    format!(
        r#"You are an expert academic evaluator. Your task is to analyze a student's answer script against a teacher's answer key (in plain text) and a structured marking scheme (JSON). You must perform two tasks: first, score the exam numerically, and second, provide constructive feedback.

**Input Data:**
* Teacher's Answer Key (Text):
{teacher_key}

* Student's Answer Script (JSON): ```json
{student_json}
```
* Marking Scheme (JSON): ```json
{scheme_json}
```

**Evaluation Instructions:**
1.  **Scoring:**
    * Assign an integer score for each question, proportional to its correctness, up to the `max_marks` in the scheme.
    * Calculate the `total_score_awarded` by summing the individual scores.
2.  **Feedback:**
    * Write brief, constructive feedback for each question explaining the score.
    * Write a brief `summary_feedback` for the student's overall performance.
3.  **Final Output:** Output must be a raw JSON object with two keys: `scores` and `feedback`.

**Output Format:**
```json
{{
  "scores": {{
    "student_id": "...",
    "total_score_awarded": ...,
    "detailed_scores": [
      {{"question_number": 1, "max_marks": ..., "marks_awarded": ...}}
    ]
  }},
  "feedback": {{
    "student_id": "...",
    "summary_feedback": "...",
    "detailed_feedback": [
      {{"question_number": 1, "feedback": "..."}}
    ]
  }}
}}
```
"#
    )
}

pub(crate) fn comparison_prompt(teacher_script: &str, student_script: &str) -> String {
    format!(
        "### Teacher's Script:\n{teacher_script}\n\n\
         ### Student's Script:\n{student_script}\n\n\
         Please compare these scripts and provide detailed feedback on the student's performance, \
         highlighting both strengths and areas for improvement."
    )
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
