//! 内置模式模板
//!
//! 文本生成失败或没有恢复出可用模式时使用。按主题关键词选择模板表，结果是确定的。

use crate::models::{Pattern, VariableDefinition};

struct Template {
    name: &'static str,
    diagram: &'static str,
    question: &'static str,
    variables: Vec<VariableDefinition>,
    difficulty: &'static str,
    objective: &'static str,
}

fn int(name: &str, min: i64, max: i64, description: &str) -> VariableDefinition {
    VariableDefinition::integer(name, min, max, description)
}

fn point(prefix: &str, index: usize, min: i64, max: i64, what: &str) -> [VariableDefinition; 2] {
    [
        int(&format!("x{}", index), min, max, &format!("x-coordinate of {} {}", prefix, what)),
        int(&format!("y{}", index), min, max, &format!("y-coordinate of {} {}", prefix, what)),
    ]
}

fn coordinate_geometry() -> Vec<Template> {
    let two_points = |min, max, what: &str| {
        let mut vars = point("first", 1, min, max, what).to_vec();
        vars.extend(point("second", 2, min, max, what));
        vars
    };
    vec![
        Template {
            name: "Distance Formula Applications in {topic}",
            diagram: "Coordinate plane with two labeled points joined by a segment",
            question: "Find the distance between points A({x1}, {y1}) and B({x2}, {y2}) shown in the coordinate plane.",
            variables: two_points(0, 10, "point"),
            difficulty: "medium",
            objective: "Apply the distance formula to two points",
        },
        Template {
            name: "Midpoint Formula Problems in {topic}",
            diagram: "Coordinate plane showing a segment with its endpoints and midpoint",
            question: "Find the midpoint of the segment joining A({x1}, {y1}) and B({x2}, {y2}).",
            variables: two_points(-5, 5, "endpoint"),
            difficulty: "easy",
            objective: "Calculate a midpoint using the midpoint formula",
        },
        Template {
            name: "Slope Analysis in {topic}",
            diagram: "Line through two points with rise and run marked",
            question: "Calculate the slope of the line passing through ({x1}, {y1}) and ({x2}, {y2}).",
            variables: two_points(0, 8, "point"),
            difficulty: "medium",
            objective: "Determine slope as rise over run",
        },
        Template {
            name: "Circle Equation Problems in {topic}",
            diagram: "Circle with center and radius marked on a coordinate grid",
            question: "Find the equation of the circle with center ({h}, {k}) and radius {r}.",
            variables: vec![
                int("h", -3, 3, "x-coordinate of the center"),
                int("k", -3, 3, "y-coordinate of the center"),
                int("r", 1, 5, "radius of the circle"),
            ],
            difficulty: "medium",
            objective: "Write the standard form equation of a circle",
        },
        Template {
            name: "Area of Triangles in {topic}",
            diagram: "Triangle with vertices at grid points",
            question: "Find the area of the triangle with vertices ({x1}, {y1}), ({x2}, {y2}) and ({x3}, {y3}).",
            variables: {
                let mut vars = two_points(0, 6, "vertex");
                vars.extend(point("third", 3, 0, 6, "vertex"));
                vars
            },
            difficulty: "hard",
            objective: "Compute triangle area from coordinates",
        },
        Template {
            name: "Line Equation from Points in {topic}",
            diagram: "Coordinate plane with a line through two labeled points",
            question: "Find the equation of the line passing through ({x1}, {y1}) and ({x2}, {y2}).",
            variables: two_points(-3, 4, "point"),
            difficulty: "hard",
            objective: "Write the equation of a line given two points",
        },
    ]
}

fn quadratics() -> Vec<Template> {
    let coefficients = |a_max: i64, b: i64, c: i64| {
        vec![
            int("a", 1, a_max, "coefficient of x squared"),
            int("b", -b, b, "coefficient of x"),
            int("c", -c, c, "constant term"),
        ]
    };
    vec![
        Template {
            name: "Roots from a Parabola in {topic}",
            diagram: "Parabola with its x-intercepts and vertex marked",
            question: "Using the graph of y = {a}x^2 + {b}x + {c}, find the roots of the equation.",
            variables: coefficients(3, 10, 15),
            difficulty: "medium",
            objective: "Read roots of a quadratic from its graph",
        },
        Template {
            name: "Vertex Form Analysis in {topic}",
            diagram: "Parabola with vertex and axis of symmetry labeled",
            question: "The parabola y = (x - {h})^2 + {k} is shown. State its vertex and axis of symmetry.",
            variables: vec![
                int("h", -4, 4, "horizontal shift"),
                int("k", -5, 5, "vertical shift"),
            ],
            difficulty: "easy",
            objective: "Identify vertex and axis of symmetry",
        },
        Template {
            name: "Discriminant Analysis in {topic}",
            diagram: "Parabola positioned relative to the x-axis",
            question: "For y = {a}x^2 + {b}x + {c}, use the graph and the discriminant to count the real roots.",
            variables: coefficients(5, 20, 25),
            difficulty: "medium",
            objective: "Relate the discriminant to the number of x-intercepts",
        },
    ]
}

fn trigonometry() -> Vec<Template> {
    vec![
        Template {
            name: "Right Triangle Trigonometry in {topic}",
            diagram: "Right triangle with one acute angle and the adjacent side labeled",
            question: "In the right triangle shown, the angle is {angle} degrees and the adjacent side is {adj} cm. Find the opposite side.",
            variables: vec![
                int("angle", 15, 75, "angle measure in degrees"),
                int("adj", 3, 12, "adjacent side length"),
            ],
            difficulty: "medium",
            objective: "Apply the tangent ratio",
        },
        Template {
            name: "Sine and Cosine Applications in {topic}",
            diagram: "Right triangle with hypotenuse and angle labeled",
            question: "Given hypotenuse {hyp} cm and angle {angle} degrees as shown, find both legs.",
            variables: vec![
                int("hyp", 5, 15, "hypotenuse length"),
                int("angle", 20, 70, "angle measure in degrees"),
            ],
            difficulty: "medium",
            objective: "Apply sine and cosine ratios",
        },
    ]
}

fn generic() -> Vec<Template> {
    vec![
        Template {
            name: "Graphical Analysis in {topic}",
            diagram: "Axes with a single plotted point",
            question: "Read the coordinates of the point plotted at ({x_value}, {y_value}) and describe its quadrant.",
            variables: vec![
                int("x_value", 0, 20, "x-coordinate"),
                int("y_value", 0, 20, "y-coordinate"),
            ],
            difficulty: "easy",
            objective: "Interpret a plotted point in {topic}",
        },
        Template {
            name: "Measurement Problems in {topic}",
            diagram: "Rectangle with labeled side lengths",
            question: "A rectangle has width {width} and height {height} as shown. Find its perimeter and area.",
            variables: vec![
                int("width", 2, 12, "rectangle width"),
                int("height", 2, 12, "rectangle height"),
            ],
            difficulty: "easy",
            objective: "Compute perimeter and area in {topic}",
        },
    ]
}

/// 按主题生成至多 `count` 个内置模式，id 从 1 开始
pub fn fallback_patterns(topic: &str, count: usize) -> Vec<Pattern> {
    let lowered = topic.to_lowercase();
    let templates = if lowered.contains("geometry") || lowered.contains("coordinate") {
        coordinate_geometry()
    } else if lowered.contains("quadratic") || lowered.contains("equation") {
        quadratics()
    } else if lowered.contains("trigon") {
        trigonometry()
    } else {
        generic()
    };

    templates
        .into_iter()
        .take(count)
        .enumerate()
        .map(|(i, t)| Pattern {
            pattern_id: i as u32 + 1,
            pattern_name: t.name.replace("{topic}", topic),
            diagram_description: t.diagram.to_string(),
            question_template: t.question.to_string(),
            variables: t.variables,
            difficulty: t.difficulty.to_string(),
            learning_objective: t.objective.replace("{topic}", topic),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_satisfies_pattern_invariants() {
        for topic in ["Coordinate Geometry", "Quadratic Equations", "Trigonometry", "Probability"] {
            let patterns = fallback_patterns(topic, 10);
            assert!(!patterns.is_empty());
            for pattern in &patterns {
                assert!(pattern.validate().is_empty(), "{}: {:?}", pattern.pattern_name, pattern.validate());
            }
        }
    }

    #[test]
    fn test_count_limits_and_ids_are_sequential() {
        let patterns = fallback_patterns("Coordinate Geometry", 2);
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].pattern_id, 1);
        assert_eq!(patterns[1].pattern_id, 2);
        assert!(patterns[0].pattern_name.ends_with("Coordinate Geometry"));
    }

    #[test]
    fn test_quadratic_coefficients_are_symmetric() {
        let patterns = fallback_patterns("Quadratic Equations", 1);
        let b = patterns[0].variables.iter().find(|v| v.name == "b").unwrap();
        assert_eq!(b.min_value, Some(-10.0));
        assert_eq!(b.max_value, Some(10.0));
    }
}
