use serde::Serialize;
use std::collections::HashMap;

const FALLBACK_TREATMENT: &str = "Consult with an agricultural expert for proper diagnosis";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiseaseRecord {
    pub description: String,
    pub treatment: Vec<String>,
}

/// A catalog hit, or the generic record for labels the catalog does not know.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDisease {
    pub name: String,
    pub record: DiseaseRecord,
    pub known: bool,
}

struct Entry {
    name: &'static str,
    description: &'static str,
    treatment: &'static [&'static str],
}

// Training pipelines name the same class differently; these map the
// remaining spellings onto catalog keys after prefix stripping.
const ALIASES: &[(&str, &str)] = &[
    ("a healthy tomato leaf", "healthy"),
    ("tomato yellow leaf curl virus", "yellow leaf curl virus"),
    ("tomato mosaic virus", "mosaic virus"),
    ("spider mites two spotted spider mite", "spider mites"),
];

const BUILTIN: &[Entry] = &[
    Entry {
        name: "Healthy",
        description: "The tomato leaf appears to be healthy with no signs of disease. The plant shows normal green coloration and no visible lesions or discoloration.",
        treatment: &[
            "Continue regular watering schedule",
            "Maintain proper fertilization",
            "Monitor plants regularly for early disease detection",
            "Ensure good air circulation around plants",
            "Remove any dead or yellowing leaves promptly",
        ],
    },
    Entry {
        name: "Early Blight",
        description: "Early blight is caused by the fungus Alternaria solani. It typically affects older leaves first, causing dark brown spots with concentric rings that resemble a target.",
        treatment: &[
            "Remove and destroy infected leaves immediately",
            "Apply copper-based fungicide every 7-10 days",
            "Improve air circulation by spacing plants properly",
            "Avoid overhead watering - water at the base of plants",
            "Use mulch to prevent soil splash onto leaves",
            "Practice crop rotation annually",
        ],
    },
    Entry {
        name: "Late Blight",
        description: "Late blight is caused by Phytophthora infestans. It spreads rapidly in cool, wet conditions and can destroy entire crops. Shows water-soaked lesions on leaves.",
        treatment: &[
            "Remove infected plants immediately to prevent spread",
            "Apply fungicide preventively in humid conditions",
            "Ensure excellent drainage in growing area",
            "Space plants properly for maximum air circulation",
            "Use resistant tomato varieties when available",
            "Destroy all infected plant material",
        ],
    },
    Entry {
        name: "Leaf Mold",
        description: "Leaf mold is caused by Passalora fulva fungus. It thrives in high humidity and causes pale green to yellowish spots on upper leaf surfaces with olive-green to brown fuzzy growth underneath.",
        treatment: &[
            "Reduce humidity in greenhouse or growing area",
            "Improve ventilation significantly",
            "Remove and destroy infected leaves",
            "Apply appropriate fungicide",
            "Use resistant varieties",
            "Avoid overhead watering",
        ],
    },
    Entry {
        name: "Septoria Leaf Spot",
        description: "Septoria leaf spot is caused by Septoria lycopersici fungus. It causes small, circular spots with gray centers and dark borders, often with tiny black dots in the center.",
        treatment: &[
            "Remove infected leaves and destroy them",
            "Mulch around plants to prevent soil splash",
            "Water at base of plants only",
            "Apply fungicide regularly during wet periods",
            "Practice crop rotation (3-4 years)",
            "Clean up all plant debris at end of season",
        ],
    },
    Entry {
        name: "Bacterial Spot",
        description: "Bacterial spot is caused by Xanthomonas bacteria. It affects leaves, stems, and fruit with small, dark, greasy-looking spots that may have a yellow halo.",
        treatment: &[
            "Use only disease-free seeds and transplants",
            "Apply copper-based bactericide",
            "Remove and destroy infected plants",
            "Avoid working with plants when wet",
            "Practice crop rotation",
            "Disinfect tools between plants",
        ],
    },
    Entry {
        name: "Yellow Leaf Curl Virus",
        description: "Yellow leaf curl virus is transmitted by whiteflies. It causes yellowing, upward curling, and severe stunting of plants. Leaves become thick and leathery.",
        treatment: &[
            "Control whitefly populations with insecticides",
            "Remove infected plants immediately",
            "Use virus-resistant tomato varieties",
            "Install fine mesh insect-proof nets",
            "Apply yellow sticky traps",
            "Keep area weed-free",
        ],
    },
    Entry {
        name: "Mosaic Virus",
        description: "Mosaic virus causes mottled yellow and green patterns on leaves. Plants may be stunted with distorted leaves and reduced fruit production.",
        treatment: &[
            "Remove and destroy infected plants immediately",
            "Control aphid populations",
            "Disinfect tools with bleach solution between plants",
            "Use virus-free certified seeds",
            "Plant resistant varieties",
            "Remove infected plants to prevent spread",
        ],
    },
    Entry {
        name: "Target Spot",
        description: "Target spot is caused by Corynespora cassiicola fungus. It produces brown lesions with concentric ring patterns resembling a target, affecting leaves, stems, and fruit.",
        treatment: &[
            "Remove infected plant debris promptly",
            "Apply fungicide treatment regularly",
            "Improve air circulation around plants",
            "Avoid overhead irrigation",
            "Practice crop rotation",
            "Use disease-resistant varieties when available",
        ],
    },
    Entry {
        name: "Spider Mites",
        description: "Spider mites are tiny pests that cause yellow stippling on leaves, fine webbing on plants, and eventual leaf bronzing and death if left untreated.",
        treatment: &[
            "Spray plants forcefully with water to dislodge mites",
            "Apply insecticidal soap or neem oil",
            "Introduce beneficial predatory mites",
            "Maintain adequate humidity levels",
            "Remove heavily infested leaves",
            "Keep plants well-watered to reduce stress",
        ],
    },
];

/// Normalizes the label spellings used by different training pipelines,
/// e.g. `Tomato___Early_blight`, `Early Blight` and
/// `A tomato leaf with Early Blight` all become `early blight`.
pub fn canonical_key(label: &str) -> String {
    let mut rest = label.trim();
    if let Some((crop, class)) = rest.split_once("___") {
        if crop.eq_ignore_ascii_case("tomato") {
            rest = class;
        }
    }

    let lowered = rest.to_lowercase();
    let lowered = lowered
        .strip_prefix("a tomato leaf with ")
        .unwrap_or(&lowered);

    let key = lowered
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, target)| target.to_string())
        .unwrap_or(key)
}

fn title_case(key: &str) -> String {
    key.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Static disease descriptions, built once at startup and only read afterwards.
#[derive(Debug, Clone)]
pub struct DiseaseCatalog {
    records: HashMap<String, (String, DiseaseRecord)>,
}

impl DiseaseCatalog {
    pub fn builtin() -> Self {
        let records = BUILTIN
            .iter()
            .map(|entry| {
                let record = DiseaseRecord {
                    description: entry.description.to_string(),
                    treatment: entry.treatment.iter().map(|s| s.to_string()).collect(),
                };
                (
                    canonical_key(entry.name),
                    (entry.name.to_string(), record),
                )
            })
            .collect();

        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn lookup(&self, label: &str) -> Option<&DiseaseRecord> {
        self.records
            .get(&canonical_key(label))
            .map(|(_, record)| record)
    }

    pub fn display_name(&self, label: &str) -> String {
        let key = canonical_key(label);
        match self.records.get(&key) {
            Some((name, _)) => name.clone(),
            None => title_case(&key),
        }
    }

    pub fn resolve(&self, label: &str) -> ResolvedDisease {
        let key = canonical_key(label);
        match self.records.get(&key) {
            Some((name, record)) => ResolvedDisease {
                name: name.clone(),
                record: record.clone(),
                known: true,
            },
            None => {
                let name = title_case(&key);
                ResolvedDisease {
                    record: DiseaseRecord {
                        description: format!("Information about {} is not available.", name),
                        treatment: vec![FALLBACK_TREATMENT.to_string()],
                    },
                    name,
                    known: false,
                }
            }
        }
    }
}
