//! Prompt templates.

pub const PLAN_SYSTEM: &str = "You are a research planning assistant. Output only valid JSON.";

pub const PLAN_EXHAUSTIVE_SYSTEM: &str = "You are a research planning assistant. Output only valid \
     JSON. Focus on generating diverse, comprehensive search queries without site: prefixes.";

pub const EXPANSION_SYSTEM: &str = "You are a search optimization expert. Output only valid JSON. \
     Be comprehensive with synonyms and platforms relevant to the specific topic and language.";

pub const DECIDE_SYSTEM: &str = "You are a helpful research assistant. Output only JSON.";

fn additional_context(extra: &str) -> String {
    if extra.trim().is_empty() {
        String::new()
    } else {
        format!("\n\nAdditional context from user:\n{}", extra)
    }
}

pub fn plan(topic: &str, extra: &str, result_links: bool) -> String {
    let links = if result_links {
        "\n\nIMPORTANT: The user wants results with DIRECT LINKS. Focus on finding specific \
         listing/item URLs, not general category pages. Each result must have its own clickable link."
    } else {
        ""
    };
    format!(
        r#"You are a Deep Research AI planning a comprehensive research task.{links}

User's research request: "{topic}"{extra}

Analyze this request and create a research plan.

The user wants SPECIFIC, CONCRETE information, not general overviews:
- products: exact prices, specific models, store links
- real estate: exact addresses, prices, property details, direct listing URLs
- comparisons: specific data points, benchmarks, specifications

Output a JSON object with:
1. "clarifying_questions": 2-4 questions that would sharpen the request (price ranges, locations, criteria)
2. "understanding_summary": 1-2 sentences on what the user wants, including criteria
3. "research_steps": 3-6 concrete steps aimed at exact listings or data
4. "expected_outcome": the SPECIFIC data the final report will contain

Respond ONLY with valid JSON:
{{
  "clarifying_questions": ["question1", "question2"],
  "understanding_summary": "...",
  "research_steps": ["step1", "step2", "step3"],
  "expected_outcome": "..."
}}"#,
        links = links,
        topic = topic,
        extra = additional_context(extra),
    )
}

pub fn plan_exhaustive(topic: &str, extra: &str) -> String {
    format!(
        r#"You are a Deep Research AI planning an EXHAUSTIVE data collection task.

User's research request: "{topic}"{extra}

The goal is to find AS MANY results as possible. Plan for broad coverage.

Output a JSON object with:
1. "clarifying_questions": 2-3 questions about the search criteria
2. "understanding_summary": 1-2 sentences on what data to collect
3. "research_steps": 3-5 specific research steps
4. "expected_outcome": what the final collection will contain
5. "search_queries": 15-25 SHORT search queries. Rules:
   - 2-5 words each
   - keyword combinations, not sentences
   - no numbers, prices, sizes or complex filters
   - no "site:" prefixes
   - vary word order, singular/plural and abbreviations
   - use the language that fits the topic

Respond ONLY with valid JSON:
{{
  "clarifying_questions": ["question1", "question2"],
  "understanding_summary": "...",
  "research_steps": ["step1", "step2", "step3"],
  "expected_outcome": "...",
  "search_queries": ["short query 1", "short query 2"]
}}"#,
        topic = topic,
        extra = additional_context(extra),
    )
}

pub fn expansion(topic: &str, seeds: &[String]) -> String {
    format!(
        r#"Generate search expansion data for this research topic and its base queries.

Topic: "{topic}"
Base queries: {seeds:?}

Produce a JSON object with:
1. "synonyms": map from key terms that appear in the queries to alternatives
   (same-meaning words, abbreviations and full forms, singular/plural,
   domain jargon, translations when several languages are relevant)
2. "platforms": "site:" prefixes for websites that specialize in this kind of
   information (marketplaces, directories, databases, country-specific sites)

Examples of platforms:
- real estate: ["site:zillow.com", "site:realtor.com"]
- tech products: ["site:amazon.com", "site:newegg.com"]
- academic research: ["site:arxiv.org", "site:researchgate.net"]

Respond ONLY with valid JSON:
{{
  "synonyms": {{"word1": ["alt1", "alt2"], "word2": ["alt1"]}},
  "platforms": ["site:example1.com", "site:example2.com"]
}}"#,
        topic = topic,
        seeds = seeds,
    )
}

pub fn decide(context: &str) -> String {
    format!(
        r#"You are a Deep Research AI. Your goal is to answer the user's query comprehensively.

Current Knowledge:
{context}

Do you have enough information to answer the user request fully and in depth?
If YES, set "final_answer" to true and "queries" to empty.
If NO, generate up to 3 search queries to find the missing information.

Respond ONLY with a valid JSON object in this format:
{{
  "final_answer": false,
  "queries": ["query 1", "query 2"]
}}"#,
        context = context,
    )
}

pub fn summarize_round(topic: &str, results: &str, result_links: bool) -> String {
    let links = if result_links {
        "\n\nCRITICAL: Extract and preserve ALL specific listing URLs (not category pages). \
         Each item MUST have its own direct link in the format: [Title](URL)"
    } else {
        ""
    };
    format!(
        r#"Here are search results for the topic "{topic}":
{results}

Extract SPECIFIC, CONCRETE information from these results:
- exact prices, addresses, specifications, dates, names
- direct URLs to specific listings or pages, not homepages
- quoted data points where available
- for listings: title, price, key details and exact URL{links}

Keep it dense and factual. Cite the exact URL for each piece of information.
Do not use <think> tags."#,
        topic = topic,
        results = results,
        links = links,
    )
}

pub fn summarize_page(title: &str, url: &str, content: &str) -> String {
    format!(
        "Summarize this webpage content in 2-3 sentences. Extract ONLY specific facts, prices, \
         addresses, dates, or key data points. Be extremely concise.\n\n\
         Title: {}\nURL: {}\nContent:\n{}\n\nSummary (2-3 sentences, facts only):",
        title, url, content
    )
}

pub fn report(topic: &str, context: &str, result_links: bool) -> String {
    let links = if result_links {
        "\n\nCRITICAL: Include direct clickable links [Title](URL) for each item."
    } else {
        ""
    };
    format!(
        "Write a research report for: {}\n\nData:\n{}\n\nFormat with Markdown. Include source URLs.{}",
        topic, context, links
    )
}
