//! The curated fallback library (§4.2, §9): a small set of hand-verified
//! problems that always satisfy the test-case minimums and never fail
//! validation, so problem selection can never come up empty.

use super::{GenerationExclusions, ProblemSource};
use crate::domain::{Difficulty, Problem, ProblemId, ProblemType, TestCase, TestCategory};
use crate::{DuelError, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;

pub struct FallbackLibrarySource;

impl FallbackLibrarySource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FallbackLibrarySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProblemSource for FallbackLibrarySource {
    async fn generate(
        &self,
        difficulty: Difficulty,
        problem_type: &ProblemType,
        exclusions: &GenerationExclusions,
    ) -> Result<Problem> {
        let candidates: Vec<Problem> = library()
            .into_iter()
            .filter(|p| p.difficulty == difficulty)
            .filter(|p| p.problem_type == *problem_type || matches!(problem_type, ProblemType::Other(_)))
            .filter(|p| !exclusions.exclude_titles.iter().any(|t| t.eq_ignore_ascii_case(&p.title)))
            .collect();

        let candidates = if candidates.is_empty() {
            // No type match at this difficulty; widen to any type rather
            // than fail the duel outright.
            library().into_iter().filter(|p| p.difficulty == difficulty).collect()
        } else {
            candidates
        };

        candidates
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| DuelError::Generation(format!("no fallback problem for difficulty {difficulty:?}")))
    }

    fn name(&self) -> &'static str {
        "fallback_library"
    }
}

fn case(input: serde_json::Value, expected: serde_json::Value, hidden: bool, category: TestCategory) -> TestCase {
    TestCase { input, expected_output: expected, hidden, category }
}

fn starter(python: &str, javascript: &str) -> BTreeMap<String, String> {
    let mut m = BTreeMap::new();
    m.insert("python".to_string(), python.to_string());
    m.insert("javascript".to_string(), javascript.to_string());
    m
}

pub(crate) fn library() -> Vec<Problem> {
    use serde_json::json;

    vec![
        Problem {
            id: ProblemId::new(),
            title: "Two Sum Values".to_string(),
            description: "Given an array of integers and a target, return the two values (ascending) that sum to the target. Exactly one valid pair exists.".to_string(),
            difficulty: Difficulty::Easy,
            problem_type: ProblemType::Array,
            fingerprint: String::new(),
            function_name: "two_sum_values".to_string(),
            parameter_signature: vec!["nums".to_string(), "target".to_string()],
            starter_code: starter(
                "def two_sum_values(nums, target):\n    pass\n",
                "function two_sum_values(nums, target) {\n}\n",
            ),
            test_cases: vec![
                case(json!([[2, 7, 11, 15], 9]), json!([2, 7]), false, TestCategory::Normal),
                case(json!([[3, 2, 4], 6]), json!([2, 4]), false, TestCategory::Normal),
                case(json!([[3, 3], 6]), json!([3, 3]), true, TestCategory::Edge),
                case(json!([[1, 5, 3, 9], 4]), json!([1, 3]), true, TestCategory::Normal),
                case(json!([[-3, 4, 3, 90], 0]), json!([-3, 3]), true, TestCategory::Edge),
                case(json!([[2, 4, 8, 16, 32, 64, 100], 102]), json!([2, 100]), true, TestCategory::Large),
                case(json!([[0, 0], 0]), json!([0, 0]), true, TestCategory::Edge),
            ],
            constraints: vec!["2 <= nums.length <= 10^4".to_string(), "exactly one valid pair exists".to_string()],
            hints: vec!["A hash map from value to index turns this into a single pass.".to_string()],
            times_used: 0,
            last_used_at: None,
            reference_solution: Some(
                "def two_sum_values(nums, target):\n    seen = set()\n    for n in nums:\n        if target - n in seen:\n            pair = sorted([n, target - n])\n            return pair\n        seen.add(n)\n".to_string(),
            ),
            from_fallback_library: true,
        },
        Problem {
            id: ProblemId::new(),
            title: "Reverse String".to_string(),
            description: "Given a string, return it reversed.".to_string(),
            difficulty: Difficulty::Easy,
            problem_type: ProblemType::String,
            fingerprint: String::new(),
            function_name: "reverse_string".to_string(),
            parameter_signature: vec!["s".to_string()],
            starter_code: starter(
                "def reverse_string(s):\n    pass\n",
                "function reverse_string(s) {\n}\n",
            ),
            test_cases: vec![
                case(json!(["hello"]), json!("olleh"), false, TestCategory::Normal),
                case(json!(["racecar"]), json!("racecar"), false, TestCategory::Normal),
                case(json!([""]), json!(""), true, TestCategory::Empty),
                case(json!(["a"]), json!("a"), true, TestCategory::Single),
                case(json!(["Hello, World!"]), json!("!dlroW ,olleH"), true, TestCategory::Edge),
                case(json!(["abcdefghijklmnopqrstuvwxyz"]), json!("zyxwvutsrqponmlkjihgfedcba"), true, TestCategory::Large),
            ],
            constraints: vec!["0 <= s.length <= 10^5".to_string()],
            hints: vec!["Two pointers from each end, or a slice reversal.".to_string()],
            times_used: 0,
            last_used_at: None,
            reference_solution: Some("def reverse_string(s):\n    return s[::-1]\n".to_string()),
            from_fallback_library: true,
        },
        Problem {
            id: ProblemId::new(),
            title: "Maximum Subarray".to_string(),
            description: "Given an array of integers, find the contiguous subarray with the largest sum and return that sum.".to_string(),
            difficulty: Difficulty::Medium,
            problem_type: ProblemType::Array,
            fingerprint: String::new(),
            function_name: "max_subarray".to_string(),
            parameter_signature: vec!["nums".to_string()],
            starter_code: starter(
                "def max_subarray(nums):\n    pass\n",
                "function max_subarray(nums) {\n}\n",
            ),
            test_cases: vec![
                case(json!([[-2, 1, -3, 4, -1, 2, 1, -5, 4]]), json!(6), false, TestCategory::Normal),
                case(json!([[5, 4, -1, 7, 8]]), json!(23), false, TestCategory::Normal),
                case(json!([[1]]), json!(1), true, TestCategory::Single),
                case(json!([[-1]]), json!(-1), true, TestCategory::Edge),
                case(json!([[-2, -3, -1, -5]]), json!(-1), true, TestCategory::Edge),
                case(json!([[3, -2, 5, -1, 6, -3, 2, 7, -5, 4]]), json!(17), true, TestCategory::Large),
                case(json!([[0, 0, 0]]), json!(0), true, TestCategory::Edge),
            ],
            constraints: vec!["1 <= nums.length <= 10^5".to_string()],
            hints: vec!["Kadane's algorithm: track the best sum ending at each position.".to_string()],
            times_used: 0,
            last_used_at: None,
            reference_solution: Some(
                "def max_subarray(nums):\n    best = current = nums[0]\n    for n in nums[1:]:\n        current = max(n, current + n)\n        best = max(best, current)\n    return best\n".to_string(),
            ),
            from_fallback_library: true,
        },
        Problem {
            id: ProblemId::new(),
            title: "Climbing Stairs".to_string(),
            description: "You can climb 1 or 2 steps at a time. Given n stairs, return the number of distinct ways to reach the top.".to_string(),
            difficulty: Difficulty::Medium,
            problem_type: ProblemType::DynamicProgramming,
            fingerprint: String::new(),
            function_name: "climb_stairs".to_string(),
            parameter_signature: vec!["n".to_string()],
            starter_code: starter(
                "def climb_stairs(n):\n    pass\n",
                "function climb_stairs(n) {\n}\n",
            ),
            test_cases: vec![
                case(json!([2]), json!(2), false, TestCategory::Normal),
                case(json!([3]), json!(3), false, TestCategory::Normal),
                case(json!([1]), json!(1), true, TestCategory::Single),
                case(json!([0]), json!(1), true, TestCategory::Edge),
                case(json!([5]), json!(8), true, TestCategory::Normal),
                case(json!([10]), json!(89), true, TestCategory::Large),
            ],
            constraints: vec!["0 <= n <= 45".to_string()],
            hints: vec!["ways(n) = ways(n-1) + ways(n-2); this is Fibonacci in disguise.".to_string()],
            times_used: 0,
            last_used_at: None,
            reference_solution: Some(
                "def climb_stairs(n):\n    a, b = 1, 1\n    for _ in range(n):\n        a, b = b, a + b\n    return a\n".to_string(),
            ),
            from_fallback_library: true,
        },
        Problem {
            id: ProblemId::new(),
            title: "Unique Elements".to_string(),
            description: "Given an array of integers, return the set of unique values it contains.".to_string(),
            difficulty: Difficulty::Easy,
            problem_type: ProblemType::SetOperations,
            fingerprint: String::new(),
            function_name: "unique_elements".to_string(),
            parameter_signature: vec!["nums".to_string()],
            starter_code: starter(
                "def unique_elements(nums):\n    pass\n",
                "function unique_elements(nums) {\n}\n",
            ),
            test_cases: vec![
                case(json!([[1, 2, 2, 3, 1]]), json!([1, 2, 3]), false, TestCategory::Normal),
                case(json!([[]]), json!([]), false, TestCategory::Empty),
                case(json!([[5]]), json!([5]), true, TestCategory::Single),
                case(json!([[1, 1, 1, 1, 1]]), json!([1]), true, TestCategory::Edge),
                case(json!([[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 1, 2, 3]]), json!([1, 2, 3, 4, 5, 6, 7, 8, 9, 10]), true, TestCategory::Large),
            ],
            constraints: vec!["0 <= nums.length <= 10^4".to_string()],
            hints: vec!["A set (or dict-as-ordered-set) dedupes in one pass.".to_string()],
            times_used: 0,
            last_used_at: None,
            reference_solution: Some(
                "def unique_elements(nums):\n    seen = []\n    for n in nums:\n        if n not in seen:\n            seen.append(n)\n    return seen\n".to_string(),
            ),
            from_fallback_library: true,
        },
        Problem {
            id: ProblemId::new(),
            title: "Number of Islands".to_string(),
            description: "Given a 2D grid of 0s and 1s, count the number of islands (groups of orthogonally-adjacent 1s).".to_string(),
            difficulty: Difficulty::Hard,
            problem_type: ProblemType::Graph,
            fingerprint: String::new(),
            function_name: "num_islands".to_string(),
            parameter_signature: vec!["grid".to_string()],
            starter_code: starter(
                "def num_islands(grid):\n    pass\n",
                "function num_islands(grid) {\n}\n",
            ),
            test_cases: vec![
                case(json!([[[1, 1, 0, 0], [1, 1, 0, 0], [0, 0, 1, 0], [0, 0, 0, 1]]]), json!(3), false, TestCategory::Normal),
                case(json!([[[1, 1, 1], [0, 1, 0], [1, 1, 1]]]), json!(1), false, TestCategory::Normal),
                case(json!([[[0, 0, 0], [0, 0, 0]]]), json!(0), true, TestCategory::Edge),
                case(json!([[[1]]]), json!(1), true, TestCategory::Single),
                case(json!([[]]), json!(0), true, TestCategory::Empty),
                case(
                    json!([[[1, 0, 1, 0, 1], [0, 1, 0, 1, 0], [1, 0, 1, 0, 1], [0, 1, 0, 1, 0], [1, 0, 1, 0, 1]]]),
                    json!(13),
                    true,
                    TestCategory::Large,
                ),
            ],
            constraints: vec!["1 <= grid.length, grid[0].length <= 300".to_string()],
            hints: vec!["Flood-fill (BFS/DFS) from each unvisited 1, marking the whole island visited.".to_string()],
            times_used: 0,
            last_used_at: None,
            reference_solution: Some(
                "def num_islands(grid):\n    if not grid:\n        return 0\n    rows, cols = len(grid), len(grid[0])\n    visited = [[False] * cols for _ in range(rows)]\n    count = 0\n\n    def flood(r, c):\n        stack = [(r, c)]\n        while stack:\n            cr, cc = stack.pop()\n            if cr < 0 or cr >= rows or cc < 0 or cc >= cols:\n                continue\n            if visited[cr][cc] or grid[cr][cc] == 0:\n                continue\n            visited[cr][cc] = True\n            stack.extend([(cr + 1, cc), (cr - 1, cc), (cr, cc + 1), (cr, cc - 1)])\n\n    for r in range(rows):\n        for c in range(cols):\n            if grid[r][c] == 1 and not visited[r][c]:\n                count += 1\n                flood(r, c)\n    return count\n".to_string(),
            ),
            from_fallback_library: true,
        },
        Problem {
            id: ProblemId::new(),
            title: "Edit Distance".to_string(),
            description: "Given two strings, return the minimum number of insertions, deletions, and substitutions to convert one into the other.".to_string(),
            difficulty: Difficulty::Expert,
            problem_type: ProblemType::DynamicProgramming,
            fingerprint: String::new(),
            function_name: "edit_distance".to_string(),
            parameter_signature: vec!["word1".to_string(), "word2".to_string()],
            starter_code: starter(
                "def edit_distance(word1, word2):\n    pass\n",
                "function edit_distance(word1, word2) {\n}\n",
            ),
            test_cases: vec![
                case(json!(["horse", "ros"]), json!(3), false, TestCategory::Normal),
                case(json!(["intention", "execution"]), json!(5), false, TestCategory::Normal),
                case(json!(["", "abc"]), json!(3), true, TestCategory::Empty),
                case(json!(["abc", "abc"]), json!(0), true, TestCategory::Edge),
                case(json!(["a", "b"]), json!(1), true, TestCategory::Single),
                case(json!(["kitten", "sitting"]), json!(3), true, TestCategory::Large),
            ],
            constraints: vec!["0 <= word1.length, word2.length <= 500".to_string()],
            hints: vec!["Classic O(mn) DP table: dp[i][j] is the distance between the first i and j characters.".to_string()],
            times_used: 0,
            last_used_at: None,
            reference_solution: Some(
                "def edit_distance(word1, word2):\n    m, n = len(word1), len(word2)\n    dp = [[0] * (n + 1) for _ in range(m + 1)]\n    for i in range(m + 1):\n        dp[i][0] = i\n    for j in range(n + 1):\n        dp[0][j] = j\n    for i in range(1, m + 1):\n        for j in range(1, n + 1):\n            if word1[i - 1] == word2[j - 1]:\n                dp[i][j] = dp[i - 1][j - 1]\n            else:\n                dp[i][j] = 1 + min(dp[i - 1][j], dp[i][j - 1], dp[i - 1][j - 1])\n    return dp[m][n]\n".to_string(),
            ),
            from_fallback_library: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_library_entry_satisfies_case_minimums() {
        for problem in library() {
            assert!(
                problem.satisfies_case_minimums(),
                "{} failed test-case minimums",
                problem.title
            );
        }
    }

    #[tokio::test]
    async fn generate_finds_a_match_for_every_known_difficulty() {
        let source = FallbackLibrarySource::new();
        for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard, Difficulty::Expert] {
            let result = source
                .generate(difficulty, &ProblemType::Array, &GenerationExclusions::default())
                .await;
            assert!(result.is_ok(), "expected a fallback problem for {difficulty:?}");
        }
    }
}
