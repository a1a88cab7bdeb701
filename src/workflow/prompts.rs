//! Prompt text for the learning and assessment workflows.

use crate::workflow::outputs::{Eval, Step};

pub const PLANNER: &str = "\
You are a Learning Experience Designer for Machine Learning.
Create plan (Intro & Main Parts) for educational content delivery.
Structure content logically with clear progression between concepts.
";

pub const LEARNER: &str = "\
You are a Machine Learning Learning Experience Designer.
Create a learning object with:
- Title: Concise description (max 10 words)
- Content: Educational material with brief intro building to main content
";

pub const MAPPER: &str = "\
You are a Machine Learning Assessment Designer.
Create 2 focused assessments that test understanding of the provided lesson content.
Each assessment should evaluate a single, specific learning objective.
";

pub const ASSESSOR: &str = "\
You are a Machine Learning Assessment Designer.
Create an evaluation with:
- Title: Concise description (max 10 words)
- Content: Single assessment item (question, problem, etc.)
- Evaluation_criteria: Clear, specific criterion being measured
";

/// Prepended to the model's conclusion when a learning session ends.
pub const CONCLUSION_PREFIX: &str = "Learning content that was introduced to the user.";

/// Shown alongside an assessment item while an answer is awaited.
pub const ANSWER_PROMPT: &str = "Please provide your answer: ";

/// Numbered plan, one block per step.
pub fn render_plan(steps: &[Step]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "{}. {}\nDescription: {}\nLearning Objective: {}\n",
                i + 1,
                s.title,
                s.description,
                s.learning_objective
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `1. title. 2. title` for steps already taught.
fn render_covered(steps: &[Step]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s.title))
        .collect::<Vec<_>>()
        .join(". ")
}

fn render_step(step: &Step) -> String {
    format!(
        "{} ({}; objective: {})",
        step.title, step.description, step.learning_objective
    )
}

pub fn render_evals(evals: &[Eval]) -> String {
    evals
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}. {}: {}", i + 1, e.title, e.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// User prompt for the `teach` node.
pub fn teach(
    plan: &[Step],
    current: &Step,
    past_steps: &[Step],
    profile: &str,
    knowledge_state: &str,
) -> String {
    let plan_str = render_plan(plan);
    let framing = if past_steps.is_empty() {
        format!(
            "You are a Learning Experience Designer.\n\
             Given this learning plan:\n{plan_str}\n\
             Your task is to provide an introduction / a warm up: {}, anticipating the main lesson.",
            render_step(current)
        )
    } else {
        format!(
            "You are a Learning Experience Designer.\n\
             Given this plan:\n{plan_str}\n\
             And, having already covered introduction: {}\n\
             Your task is to teach: {}.",
            render_covered(past_steps),
            render_step(current)
        )
    };
    format!(
        "{framing}\nContent is presented to: {profile}.\n\
         Who's current knowledge state is: {knowledge_state}"
    )
}

/// Prompt for the `replan` node.
pub fn replan(input: &str, plan: &[Step], past_steps: &[Step]) -> String {
    format!(
        "{PLANNER}\n\
         You are a Learning Experience Designer for Machine Learning.\n\n\
         Topic: {input}\n\
         Plan: {}\n\
         Completed Step: {}\n\n\
         Take one action:\n\
         a. If both plan steps are completed: Provide a succinct conclusion summarizing key points\n\
         b. Otherwise: Return only the remaining step (do not repeat completed steps)\n",
        render_plan(plan),
        render_covered(past_steps)
    )
}

/// User prompt for the `evaluate` node. The current item is always the first.
pub fn evaluate(input: &str, evals: &[Eval], current: &Eval) -> String {
    format!(
        "Given this learning session content {input}\n\n, and evaluation plan:\n{}\n\
         You are tasked with executing evaluation 1: {}: {}.\n\
         Questions / tasks must directly align with the learning session content.",
        render_evals(evals),
        current.title,
        current.description
    )
}

/// Question/answer pairs collected so far, numbered in presentation order.
fn render_responses(questions: &[String], answers: &[String]) -> String {
    if answers.is_empty() {
        return "None yet".to_string();
    }
    answers
        .iter()
        .enumerate()
        .map(|(i, answer)| {
            let question = questions.get(i).map(|q| q.trim()).unwrap_or("");
            format!("{}. Question: {question}\n   Answer: {}", i + 1, answer.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt for the `remap` node.
pub fn remap(
    input: &str,
    evals: &[Eval],
    past_evals: &[Eval],
    questions: &[String],
    answers: &[String],
) -> String {
    format!(
        "You are a Machine Learning Assessment Designer.\n\n\
         Lesson: {input}\n\
         Evaluations: {}\n\
         Completed Evaluations: {}\n\
         Learner Responses:\n{}\n\n\
         Take one action:\n\
         a. If both evaluations are completed: Provide a report summarizing performance, \
         judged on the learner responses above\n\
         b. Otherwise: Return only the remaining uncompleted evaluation\n",
        render_evals(evals),
        render_evals(past_evals),
        render_responses(questions, answers)
    )
}

/// Python-style list literal: `['a', 'b']`.
fn list_literal(items: &[String]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .map(|s| {
            if s.contains('\'') && !s.contains('"') {
                format!("\"{s}\"")
            } else {
                format!("'{}'", s.replace('\'', "\\'"))
            }
        })
        .collect();
    format!("[{}]", quoted.join(", "))
}

/// Suffix appended to the model's report: every question and every answer.
pub fn report_appendix(questions: &[String], answers: &[String]) -> String {
    let numbered: Vec<String> = questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. {}", i + 1, q.trim()))
        .collect();
    format!(
        "Questions: {} | Answers: {}",
        list_literal(&numbered),
        list_literal(answers)
    )
}
