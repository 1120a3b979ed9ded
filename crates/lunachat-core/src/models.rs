/// A hosted model the inference API can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub max_tokens: u32,
    pub developer: &'static str,
}

impl ModelDescriptor {
    /// Token budget a fresh selection of this model starts with
    pub fn default_budget(&self) -> u32 {
        self.max_tokens.min(32768)
    }

    /// Clamp a requested budget into `1..=max_tokens`
    pub fn clamp_budget(&self, requested: u32) -> u32 {
        requested.clamp(1, self.max_tokens)
    }
}

const MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "llama3-70b-8192",
        name: "LLaMA3-70b-8192",
        max_tokens: 8192,
        developer: "Meta",
    },
    ModelDescriptor {
        id: "llama3-8b-8192",
        name: "LLaMA3-8b-8192",
        max_tokens: 8192,
        developer: "Meta",
    },
    ModelDescriptor {
        id: "mixtral-8x7b-32768",
        name: "Mixtral-8x7b-Instruct-v0.1",
        max_tokens: 32768,
        developer: "Mistral",
    },
];

pub fn all() -> &'static [ModelDescriptor] {
    MODELS
}

pub fn find(id: &str) -> Option<&'static ModelDescriptor> {
    MODELS.iter().find(|m| m.id == id)
}

pub fn default_model() -> &'static ModelDescriptor {
    &MODELS[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_known_and_unknown() {
        assert_eq!(find("llama3-8b-8192").map(|m| m.developer), Some("Meta"));
        assert!(find("gemma-7b-it").is_none());
    }

    #[test]
    fn test_default_is_first_entry() {
        assert_eq!(default_model().id, "llama3-70b-8192");
    }

    #[test]
    fn test_capacities_within_expected_range() {
        for m in all() {
            assert!((8192..=32768).contains(&m.max_tokens), "{}", m.id);
        }
    }

    #[test]
    fn test_clamp_budget() {
        let m = find("llama3-70b-8192").unwrap();
        assert_eq!(m.clamp_budget(0), 1);
        assert_eq!(m.clamp_budget(1024), 1024);
        assert_eq!(m.clamp_budget(100_000), 8192);
        assert_eq!(m.default_budget(), 8192);
    }
}
