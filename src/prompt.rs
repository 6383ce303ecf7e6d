/// The three form fields a description is generated from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobInput {
    pub title: String,
    pub skills: String,
    pub experience: String,
}

impl JobInput {
    pub fn new(title: impl Into<String>, skills: impl Into<String>, experience: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            skills: skills.into(),
            experience: experience.into(),
        }
    }

    /// Every field holds something other than whitespace.
    pub fn is_complete(&self) -> bool {
        [&self.title, &self.skills, &self.experience]
            .iter()
            .all(|f| !f.trim().is_empty())
    }
}

pub fn build_prompt(input: &JobInput) -> String {
    format!(
        "As an expert AI HR assistant, generate a professional and engaging job description suitable for a LinkedIn post.

The job description should be based on the following details:
- **Job Title:** {title}
- **Key Skills & Technologies:** {skills}
- **Required Experience:** {experience}

The output should be well-structured and include the following sections in this order:
1. **Introduction:** A brief, exciting overview of the role and our company. Use a positive and welcoming tone.
2. **Key Responsibilities:** A bulleted list of the main duties and tasks for this position. Use action verbs.
3. **Qualifications & Skills:** A bulleted list detailing the necessary skills, qualifications, and experience.
4. **Why Join Us?:** A short paragraph about our company culture, benefits, or what makes us a great place to work.

Format the entire output in Markdown for easy readability. Ensure the formatting is clean with clear headings and bullet points. \
Do not include any introductory or concluding text outside of the job description itself, such as \"Here is the job description you requested:\".
",
        title = input.title.trim(),
        skills = input.skills.trim(),
        experience = input.experience.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_fields_are_incomplete() {
        assert!(JobInput::new("Backend Engineer", "Go, Postgres", "3+ years").is_complete());
        assert!(!JobInput::new("Backend Engineer", "  ", "3+ years").is_complete());
        assert!(!JobInput::new("", "Go", "3+ years").is_complete());
        assert!(!JobInput::default().is_complete());
    }

    #[test]
    fn prompt_lists_details_and_sections_in_order() {
        let p = build_prompt(&JobInput::new(" Backend Engineer ", "Go, Postgres", "3+ years"));

        assert!(p.contains("- **Job Title:** Backend Engineer\n"));
        assert!(p.contains("- **Key Skills & Technologies:** Go, Postgres\n"));
        assert!(p.contains("- **Required Experience:** 3+ years\n"));

        let order = ["**Introduction:**", "**Key Responsibilities:**", "**Qualifications & Skills:**", "**Why Join Us?:**"];
        let positions: Vec<usize> = order.iter().map(|s| p.find(s).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        assert!(p.contains("Markdown"));
        assert!(p.contains("Do not include any introductory or concluding text"));
    }
}
