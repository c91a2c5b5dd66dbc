//! Built-in benchmark fixture set
//!
//! A small sample of DeepSearchQA and FACTS multimodal cases, used when no
//! dataset file is supplied.

use super::BenchmarkCase;

/// All built-in cases, DSQA first, in dataset order
pub fn builtin_cases() -> Vec<BenchmarkCase> {
    let mut cases = dsqa_cases();
    cases.extend(facts_cases());
    cases
}

fn dsqa_cases() -> Vec<BenchmarkCase> {
    vec![
        BenchmarkCase::dsqa(
            "DSQA-001",
            "Physics",
            "Explain the causal chain leading to the collapse of the Tacoma Narrows Bridge, focusing on aeroelastic flutter.",
            [
                "Wind induced oscillation",
                "Aeroelastic flutter caused energy accumulation",
                "Torsional vibration mode matched wind frequency",
                "Mechanical failure of suspension cables",
            ],
        ),
        BenchmarkCase::dsqa(
            "DSQA-002",
            "History",
            "Trace the economic impact of the Black Death on serfdom in Western Europe.",
            [
                "Drastic population reduction",
                "Labor shortage increased wages",
                "Landowners lost bargaining power",
                "Accelerated end of serfdom",
            ],
        ),
        BenchmarkCase::dsqa(
            "DSQA-003",
            "Medicine",
            "What is the mechanism by which mRNA vaccines induce immunity against SARS-CoV-2?",
            [
                "Lipid nanoparticle delivery",
                "Cellular uptake of mRNA",
                "Translation of spike protein",
                "Immune recognition of spike protein",
                "Antibody production",
            ],
        ),
        BenchmarkCase::dsqa(
            "DSQA-004",
            "Economics",
            "Analyze the relationship between interest rate hikes and inflation reduction.",
            [
                "Higher borrowing costs",
                "Reduced consumer spending",
                "Lower business investment",
                "Decreased demand lowers prices",
            ],
        ),
        BenchmarkCase::dsqa(
            "DSQA-005",
            "Computer Science",
            "How does the Transformer architecture solve the vanishing gradient problem in RNNs?",
            [
                "Self-attention mechanism",
                "Parallel processing",
                "Residual connections",
                "Layer normalization",
            ],
        ),
    ]
}

fn facts_cases() -> Vec<BenchmarkCase> {
    vec![
        BenchmarkCase::facts(
            "FACTS-001",
            "Geography",
            "Identify the biome and potential ecological features.",
            "An image showing a dense forest with a river flowing through it.",
            [
                "Temperate deciduous forest",
                "Riparian zone presence",
                "High biodiversity potential",
            ],
        )
        .with_image("https://picsum.photos/id/10/800/600"),
        BenchmarkCase::facts(
            "FACTS-002",
            "Technology",
            "Describe the objects and their typical usage context.",
            "A workspace with a laptop and coffee.",
            [
                "Portable computer",
                "Office or remote work setting",
                "Beverage for consumption",
            ],
        )
        .with_image("https://picsum.photos/id/0/800/600"),
        BenchmarkCase::facts(
            "FACTS-003",
            "Architecture",
            "Analyze the structural style and lighting.",
            "A view of modern city architecture at night.",
            [
                "Urban skyline",
                "Artificial illumination",
                "High-rise construction",
            ],
        )
        .with_image("https://picsum.photos/id/122/800/600"),
    ]
}
